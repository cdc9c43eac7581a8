/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render command implementation
 */

//! Render command implementation.
//!
//! `datamd render doc.dmd` writes `doc.md` next to the input (or to `-o`).
//! `datamd render dir/` processes every `*.dmd` directly inside `dir`, writing
//! the results next to their inputs or into the `-o` directory. A document
//! that cannot be read or written does not stop the batch, but makes the
//! command fail at the end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use datamd_core::{ProcessingStats, Processor};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::load_configuration;

const INPUT_EXTENSION: &str = "dmd";
const OUTPUT_EXTENSION: &str = "md";

/// Arguments for the render command
#[derive(Debug)]
pub struct RenderArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub max_memory: Option<f64>,
    pub no_cache: bool,
    /// Print diagnostics as JSON lines instead of text
    pub json: bool,
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input path does not exist: {}", args.input.display());
    }

    let mut overrides: Vec<(&str, Value)> = Vec::new();
    if let Some(chunk_size) = args.chunk_size {
        overrides.push(("performance.chunk_size", Value::from(chunk_size)));
    }
    if let Some(max_memory) = args.max_memory {
        overrides.push(("performance.max_memory_mb", Value::from(max_memory)));
    }
    if args.no_cache {
        overrides.push(("cache.enabled", Value::Bool(false)));
    }
    let loaded = load_configuration(args.config.as_deref(), overrides)?;

    let processor = Processor::new(loaded.config).context("Failed to set up the processor")?;
    debug!("{:?}", processor);

    let jobs = plan(&args.input, args.output.as_deref())?;
    if jobs.is_empty() {
        warn!("No .{} files found in {}", INPUT_EXTENSION, args.input.display());
        return Ok(());
    }
    info!("Rendering {} document(s)", jobs.len());

    let mut totals = ProcessingStats::default();
    let mut failed = 0;
    for (input, output) in &jobs {
        match render_document(&processor, input, output, args.json) {
            Ok(stats) => totals.merge(&stats),
            Err(e) => {
                failed += 1;
                error!("{}: {:#}", input.display(), e);
            }
        }
    }

    info!(
        directives = totals.directives,
        cache_hits = totals.cache_hits,
        failures = totals.failures,
        invalid = totals.invalid,
        "Rendered {} of {} document(s)",
        jobs.len() - failed,
        jobs.len()
    );

    if failed > 0 {
        anyhow::bail!("{} of {} document(s) could not be rendered", failed, jobs.len());
    }
    Ok(())
}

/// Pairs of (input, output) paths.
fn plan(input: &Path, output: Option<&Path>) -> Result<Vec<(PathBuf, PathBuf)>> {
    if input.is_file() {
        let target = match output {
            Some(path) => path.to_path_buf(),
            None => input.with_extension(OUTPUT_EXTENSION),
        };
        if target == input {
            anyhow::bail!(
                "Output would overwrite the input {}; pass -o to choose another file",
                input.display()
            );
        }
        return Ok(vec![(input.to_path_buf(), target)]);
    }

    let mut inputs: Vec<PathBuf> = WalkDir::new(input)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext == INPUT_EXTENSION)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    inputs.sort();

    if let Some(dir) = output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    Ok(inputs
        .into_iter()
        .map(|path| {
            let target = match (output, path.file_name()) {
                (Some(dir), Some(name)) => dir.join(name).with_extension(OUTPUT_EXTENSION),
                _ => path.with_extension(OUTPUT_EXTENSION),
            };
            (path, target)
        })
        .collect())
}

/// Render one document. Diagnostics are printed; only I/O problems are errors.
fn render_document(
    processor: &Processor,
    input: &Path,
    output: &Path,
    json: bool,
) -> Result<ProcessingStats> {
    debug!("Rendering {}", input.display());
    let result = processor
        .process_file(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    for diagnostic in &result.diagnostics {
        if json {
            eprintln!("{}", diagnostic.to_json());
        } else {
            eprintln!("{}", diagnostic.to_text());
        }
    }

    std::fs::write(output, &result.text)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("{} -> {}", input.display(), output.display());
    Ok(result.stats)
}
