//! Directive preprocessing for DataMD documents
//!
//! DataMD documents are Markdown with inline directives such as
//! `{{ csv "sales.csv" transform="filter:amount>1000|sort:-amount" }}`.
//! This crate finds those directives, turns each one into Markdown, and
//! writes the result back in place.
//!
//! # Architecture
//!
//! - [`Processor`] - Scans a document, runs directives on a worker pool, assembles the output
//! - [`HandlerRegistry`] / [`DirectiveHandler`] - One handler per command name
//! - [`path::resolve`] - Turns a subject path into a checked [`ResolvedPath`]
//! - [`sanitize()`] - Cleans raw arguments against a [`CommandSignature`]
//! - [`CacheManager`] - On-disk cache keyed by file, mtime, command and arguments
//! - [`transform`] - The `filter`/`sort`/`limit`/`groupby` chain over a [`Table`]
//! - [`stream`] - Chunked application of a chain to large inputs
//!
//! # Example
//!
//! ```no_run
//! use datamd_config::Configuration;
//! use datamd_core::Processor;
//! use std::path::Path;
//!
//! let processor = Processor::new(Configuration::default())?;
//! let output = processor.process("{{ csv \"data.csv\" }}\n", Path::new("."), None);
//! for diagnostic in &output.diagnostics {
//!     eprintln!("{}", diagnostic.to_text());
//! }
//! # Ok::<(), datamd_core::DataMdError>(())
//! ```

pub mod cache;
pub mod directive;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod path;
pub mod processor;
pub mod sanitize;
pub mod stream;
pub mod table;
pub mod transform;

// Re-export commonly used types
pub use cache::{CacheInfo, CacheKey, CacheManager};
pub use directive::{DirectiveInvocation, LinePart, parse_directive, scan_line};
pub use error::{
    DataMdError, DirectiveError, DirectiveFailure, HandlerError, PathError, Result,
    SanitizationError,
};
pub use handler::{DirectiveHandler, HandlerRegistry, HandlerRequest, RenderedBlock};
pub use path::ResolvedPath;
pub use processor::{ProcessOutput, ProcessingStats, Processor};
pub use sanitize::{
    Adjustment, ArgKind, ArgSpec, ArgValue, CharFilter, CommandSignature, SanitizedArgs, sanitize,
};
pub use stream::{StreamingAdapter, boundary_marker};
pub use table::{Cell, Table};
pub use transform::{TransformOp, TransformSyntaxError};
