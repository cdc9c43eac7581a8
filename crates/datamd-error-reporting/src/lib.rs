//! Error reporting and diagnostic messages for DataMD.
//!
//! This crate provides the structured diagnostics that the directive
//! processor and the configuration loader emit. Diagnostics never abort
//! processing on their own: they are collected into a diagnostics channel
//! and shown to the user after a document has been processed.
//!
//! # Architecture
//!
//! - [`DiagnosticMessage`]: The main message structure (title, problem, details, hints)
//! - [`DiagnosticMessageBuilder`]: Tidyverse-style builder for messages
//! - [`SourceLocation`]: Where in a document a diagnostic applies
//! - [`catalog`]: Error codes (`DMD-<subsystem>-<n>`) and their metadata
//!
//! # Example
//!
//! ```
//! use datamd_error_reporting::DiagnosticMessageBuilder;
//!
//! let warning = DiagnosticMessageBuilder::warning("Malformed directive")
//!     .with_code("DMD-1-1")
//!     .problem("The subject path is missing its closing quote")
//!     .add_hint("Close the quoted path with `\"`?")
//!     .build();
//!
//! assert!(warning.to_text().contains("[DMD-1-1]"));
//! ```

pub mod builder;
pub mod catalog;
pub mod diagnostic;

pub use builder::DiagnosticMessageBuilder;
pub use catalog::{ERROR_CATALOG, ErrorCodeInfo, get_docs_url, get_error_info, get_subsystem};
pub use diagnostic::{
    DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage, MessageContent, SourceLocation,
};
