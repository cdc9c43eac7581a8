/*
 * handlers/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Built-in directive handlers.
 */

//! Built-in handlers.
//!
//! `csv`, `json` and `video` are implemented here. Spreadsheet, PDF, OCR,
//! thumbnail and chart commands need external decoders; they are registered
//! as [`ExternalHandler`] placeholders that validate arguments and then report
//! that no decoder is available, until an application registers a real
//! handler under the same name.

mod csv;
mod external;
mod json;
mod video;

pub use self::csv::CsvHandler;
pub use external::ExternalHandler;
pub use json::JsonHandler;
pub use video::VideoHandler;

use crate::error::HandlerError;
use crate::handler::HandlerRegistry;
use crate::sanitize::{ArgKind, ArgSpec, CharFilter, SanitizedArgs};
use crate::transform::{self, TransformOp};

pub(crate) fn register_builtins(registry: &mut HandlerRegistry) {
    registry.register(Box::new(CsvHandler));
    registry.register(Box::new(JsonHandler));
    registry.register(Box::new(VideoHandler));
    for handler in external::placeholders() {
        registry.register(Box::new(handler));
    }
}

/// The `transform=` keyword shared by tabular commands.
pub(crate) fn transform_arg() -> ArgSpec {
    ArgSpec::keyword(
        "transform",
        ArgKind::Text {
            max_len: 1000,
            filter: CharFilter::Printable,
            default: None,
        },
    )
}

/// Parsed transform chain of a request, empty when none was given.
pub(crate) fn transform_ops(args: &SanitizedArgs) -> Result<Vec<TransformOp>, HandlerError> {
    match args.text("transform") {
        Some(chain) => Ok(transform::parse(chain)?),
        None => Ok(Vec::new()),
    }
}

/// Integer argument in 1..=4096 pixels.
pub(crate) fn dimension(default: i64) -> ArgKind {
    ArgKind::Int {
        min: 1,
        max: 4096,
        default,
    }
}
