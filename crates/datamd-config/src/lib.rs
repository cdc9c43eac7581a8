/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Layered configuration for DataMD.
 */

//! Configuration for the DataMD processor.
//!
//! A [`Configuration`] is assembled by a [`Loader`] from built-in defaults,
//! an optional JSON or YAML file, `DATAMD_<SECTION>_<KEY>` environment
//! variables and explicit overrides, in that order of precedence.
//!
//! ```
//! use datamd_config::Loader;
//!
//! let config = Loader::new()
//!     .with_env([("DATAMD_PERFORMANCE_CHUNK_SIZE", "500")])
//!     .set_override("security.allow_directory_traversal", true)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.performance.chunk_size, 500);
//! assert!(config.security.allow_directory_traversal);
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod env;
mod loader;
mod types;

pub use env::{ENV_PREFIX, env_var_name, parse_bool};
pub use loader::{CONFIG_FILE_ENV, LoadedConfig, Loader, merge_values, read_config_file};
pub use types::{
    ApplicationConfig, CacheConfig, Configuration, Feature, FeaturesConfig, LimitsConfig,
    PerformanceConfig, ProcessingConfig, SecurityConfig,
};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value {value:?} for {var}: expected {expected}")]
    InvalidEnv {
        var: String,
        value: String,
        expected: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration has the wrong shape: {0}")]
    Deserialize(#[from] serde_json::Error),
}
