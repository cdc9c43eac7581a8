/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Cache command implementation
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use datamd_core::CacheManager;

use super::configuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    Clear,
    Info,
    Sweep,
}

/// Arguments for the cache command
#[derive(Debug)]
pub struct CacheArgs {
    pub action: CacheCommand,
    pub config: Option<PathBuf>,
}

/// Execute the cache command
///
/// Works on the configured cache directory even when caching is disabled.
pub fn execute(args: CacheArgs) -> Result<()> {
    let config = configuration(args.config.as_deref())?;
    let directory = config.cache.resolve_directory();
    let cache = CacheManager::new(&directory, Duration::from_secs(config.cache.ttl_seconds))
        .with_context(|| format!("Failed to open cache at {}", directory.display()))?;

    match args.action {
        CacheCommand::Clear => {
            let removed = cache.clear().context("Failed to clear the cache")?;
            println!("Removed {} cache entries from {}", removed, directory.display());
        }
        CacheCommand::Sweep => {
            let removed = cache.sweep().context("Failed to sweep the cache")?;
            println!("Removed {} expired cache entries", removed);
        }
        CacheCommand::Info => {
            let info = cache.info().context("Failed to read the cache")?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            if !config.cache.enabled {
                eprintln!("Note: caching is disabled by configuration (cache.enabled)");
            }
        }
    }
    Ok(())
}
