//! DataMD CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "datamd")]
#[command(version)]
#[command(about = "Expand data directives in Markdown documents", long_about = None)]
struct Cli {
    /// More log output (-v for debug)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a .dmd document, or every .dmd document in a directory
    Render {
        /// Input file or directory
        input: PathBuf,

        /// Output file (or directory, when the input is a directory)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Configuration file (JSON or YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Rows per chunk when streaming large inputs
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Memory budget in MB; larger inputs are streamed
        #[arg(long)]
        max_memory: Option<f64>,

        /// Do not read or write the result cache
        #[arg(long)]
        no_cache: bool,

        /// Print diagnostics as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Configuration file (JSON or YAML)
        #[arg(long, global = true)]
        config: Option<PathBuf>,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,

        /// Configuration file (JSON or YAML)
        #[arg(long, global = true)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum CacheAction {
    /// Remove every cache entry
    Clear,
    /// Show the cache location, entry count and size
    Info,
    /// Remove expired entries
    Sweep,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged configuration
    Show {
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,

        /// Print a single value by dotted key (e.g. performance.chunk_size)
        #[arg(long)]
        key: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match (cli.quiet, cli.verbose) {
        (true, _) => "datamd=warn",
        (false, 0) => "datamd=info",
        (false, _) => "datamd=debug",
    };
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Render {
            input,
            output,
            config,
            chunk_size,
            max_memory,
            no_cache,
            json,
        } => commands::render::execute(commands::render::RenderArgs {
            input,
            output,
            config,
            chunk_size,
            max_memory,
            no_cache,
            json,
        }),
        Commands::Cache { action, config } => {
            let action = match action {
                CacheAction::Clear => commands::cache::CacheCommand::Clear,
                CacheAction::Info => commands::cache::CacheCommand::Info,
                CacheAction::Sweep => commands::cache::CacheCommand::Sweep,
            };
            commands::cache::execute(commands::cache::CacheArgs { action, config })
        }
        Commands::Config { action, config } => match action {
            ConfigAction::Show { json, key } => {
                commands::config::execute(commands::config::ConfigArgs { config, json, key })
            }
        },
    }
}
