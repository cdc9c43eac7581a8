//! Command implementations for the DataMD CLI
//!
//! Each command module handles the CLI interface and delegates to
//! datamd-core for the actual work.

pub mod cache;
pub mod config;
pub mod render;

use std::path::Path;

use anyhow::{Context, Result};
use datamd_config::{Configuration, LoadedConfig, Loader};
use serde_json::Value;

/// Load the configuration from defaults, `file` (or `DATAMD_CONFIG_FILE`),
/// the environment and `overrides`.
///
/// Layers that fail to load are skipped with a warning on stderr; only an
/// invalid final configuration is an error.
pub fn load_configuration(
    file: Option<&Path>,
    overrides: Vec<(&str, Value)>,
) -> Result<LoadedConfig> {
    let mut loader = Loader::new();
    if let Some(file) = file {
        loader = loader.with_file(file);
    }
    loader = loader.with_process_env();
    for (key, value) in overrides {
        loader = loader.set_override(key, value);
    }

    let loaded = loader.load().context("Invalid configuration")?;
    for warning in &loaded.warnings {
        eprintln!("{}", warning.to_text());
    }
    if let Some(source) = &loaded.source_file {
        tracing::debug!("Configuration file: {}", source.display());
    }
    Ok(loaded)
}

/// [`load_configuration`] without overrides, returning just the snapshot.
pub fn configuration(file: Option<&Path>) -> Result<Configuration> {
    load_configuration(file, Vec::new()).map(|loaded| loaded.config)
}
