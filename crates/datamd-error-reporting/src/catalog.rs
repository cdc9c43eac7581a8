//! Error code catalog and lookup.
//!
//! This module provides access to the centralized error catalog, which maps
//! error codes (like "DMD-2-2") to their metadata (title, message template, docs URL).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata for an error code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorCodeInfo {
    /// Subsystem name (e.g., "directive", "path", "config")
    pub subsystem: String,

    /// Short title for the error
    pub title: String,

    /// Default message template
    pub message_template: String,

    /// URL to documentation (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,

    /// When this error was introduced (version)
    pub since_version: String,
}

/// Global error catalog, embedded at compile time.
///
/// # Panics
///
/// Panics if the embedded JSON is invalid. This can only happen if the
/// catalog file is edited incorrectly.
pub static ERROR_CATALOG: Lazy<HashMap<String, ErrorCodeInfo>> = Lazy::new(|| {
    let json_data = include_str!("../error_catalog.json");
    serde_json::from_str(json_data).expect("Invalid error catalog JSON - this is a bug in DataMD")
});

/// Look up error code information.
///
/// Returns `None` if the error code is not found in the catalog.
pub fn get_error_info(code: &str) -> Option<&ErrorCodeInfo> {
    ERROR_CATALOG.get(code)
}

/// Get documentation URL for an error code.
pub fn get_docs_url(code: &str) -> Option<&str> {
    ERROR_CATALOG
        .get(code)
        .and_then(|info| info.docs_url.as_deref())
}

/// Get the subsystem name for an error code.
pub fn get_subsystem(code: &str) -> Option<&str> {
    ERROR_CATALOG.get(code).map(|info| info.subsystem.as_str())
}
