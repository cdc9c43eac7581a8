/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Config command implementation
 */

use std::path::PathBuf;

use anyhow::Result;

use super::load_configuration;

/// Arguments for `config show`
#[derive(Debug)]
pub struct ConfigArgs {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub key: Option<String>,
}

/// Print the effective configuration (or one value of it).
pub fn execute(args: ConfigArgs) -> Result<()> {
    let loaded = load_configuration(args.config.as_deref(), Vec::new())?;

    let value = match &args.key {
        Some(key) => loaded
            .config
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", key))?,
        None => serde_json::to_value(&loaded.config)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", serde_yaml::to_string(&value)?);
    }
    Ok(())
}
