/*
 * handlers/external.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Commands whose decoders live outside this crate.
 */

use datamd_config::{Configuration, Feature};

use super::{dimension, transform_arg};
use crate::error::HandlerError;
use crate::handler::{DirectiveHandler, HandlerRequest, RenderedBlock};
use crate::sanitize::{ArgKind, ArgSpec, CharFilter, CommandSignature};

/// A command that is recognised and argument-checked but has no decoder.
///
/// Directives naming it still go through feature gating, sanitization and
/// path resolution, so a document gets the same diagnostics it would with a
/// real decoder installed. Handling always fails with
/// [`HandlerError::NoDecoder`].
pub struct ExternalHandler {
    name: &'static str,
    signature: fn(&Configuration) -> CommandSignature,
    feature: Option<Feature>,
}

impl ExternalHandler {
    pub fn new(
        name: &'static str,
        signature: fn(&Configuration) -> CommandSignature,
        feature: Option<Feature>,
    ) -> Self {
        Self {
            name,
            signature,
            feature,
        }
    }
}

impl DirectiveHandler for ExternalHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn signature(&self, config: &Configuration) -> CommandSignature {
        (self.signature)(config)
    }

    fn required_feature(&self) -> Option<Feature> {
        self.feature
    }

    fn cacheable(&self) -> bool {
        false
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
        tracing::debug!(command = request.command, path = request.raw_path, "No decoder installed");
        Err(HandlerError::NoDecoder(self.name.to_string()))
    }
}

pub(crate) fn placeholders() -> Vec<ExternalHandler> {
    let mut handlers: Vec<ExternalHandler> = ["xlsx", "xls", "xlsm", "ods"]
        .into_iter()
        .map(|name| ExternalHandler::new(name, spreadsheet, None))
        .collect();
    handlers.extend([
        ExternalHandler::new("pdf", pdf, Some(Feature::PdfProcessing)),
        ExternalHandler::new("pdf_table", pdf_table, Some(Feature::PdfProcessing)),
        ExternalHandler::new("image_ocr", image_ocr, Some(Feature::Ocr)),
        ExternalHandler::new("video_thumb", video_thumb, Some(Feature::VideoSupport)),
        ExternalHandler::new("chart", chart, None),
    ]);
    handlers
}

fn words(options: &[&str]) -> Vec<String> {
    options.iter().map(|s| s.to_string()).collect()
}

fn percent(default: f64) -> ArgKind {
    ArgKind::Float {
        min: 0.0,
        max: 100.0,
        default,
    }
}

fn label() -> ArgKind {
    ArgKind::Text {
        max_len: 200,
        filter: CharFilter::Printable,
        default: None,
    }
}

fn spreadsheet(_config: &Configuration) -> CommandSignature {
    CommandSignature::new(vec![
        ArgSpec::positional("sheet", 0, ArgKind::SheetRef),
        transform_arg(),
    ])
}

fn pdf(config: &Configuration) -> CommandSignature {
    CommandSignature::new(vec![ArgSpec::positional(
        "pages",
        0,
        ArgKind::Pages {
            max: i64::from(config.limits.max_pages_pdf),
        },
    )])
}

fn pdf_table(config: &Configuration) -> CommandSignature {
    let strategies = words(&["lines", "text", "explicit"]);
    let default = config.processing.default_pdf_strategy.clone();
    CommandSignature::new(vec![
        ArgSpec::positional(
            "page",
            0,
            ArgKind::Int {
                min: 1,
                max: i64::from(config.limits.max_pages_pdf.max(1)),
                default: 1,
            },
        ),
        ArgSpec::positional(
            "horizontal",
            1,
            ArgKind::Choice {
                options: strategies.clone(),
                default: default.clone(),
            },
        ),
        ArgSpec::positional(
            "vertical",
            2,
            ArgKind::Choice {
                options: strategies,
                default,
            },
        ),
        ArgSpec::keyword("snap", percent(3.0)),
        ArgSpec::keyword("edge", percent(3.0)),
        ArgSpec::keyword("intersect", percent(3.0)),
        transform_arg(),
    ])
}

fn image_ocr(config: &Configuration) -> CommandSignature {
    CommandSignature::new(vec![ArgSpec::positional(
        "lang",
        0,
        ArgKind::Choice {
            options: config.limits.supported_languages.clone(),
            default: config.processing.default_ocr_language.clone(),
        },
    )])
}

fn video_thumb(config: &Configuration) -> CommandSignature {
    CommandSignature::new(vec![
        ArgSpec::positional(
            "time",
            0,
            ArgKind::Float {
                min: 0.0,
                max: f64::MAX,
                default: 1.0,
            },
        ),
        ArgSpec::positional(
            "width",
            1,
            dimension(i64::from(config.processing.video_thumb_width)),
        ),
        ArgSpec::positional(
            "height",
            2,
            dimension(i64::from(config.processing.video_thumb_height)),
        ),
    ])
}

fn chart(_config: &Configuration) -> CommandSignature {
    let axis = || ArgKind::Identifier {
        max_len: 64,
        required: false,
    };
    CommandSignature::new(vec![
        ArgSpec::positional(
            "type",
            0,
            ArgKind::Choice {
                options: words(&["bar", "line", "pie", "scatter", "histogram"]),
                default: "bar".to_string(),
            },
        ),
        ArgSpec::positional("x", 1, axis()),
        ArgSpec::positional("y", 2, axis()),
        ArgSpec::keyword("title", label()),
        ArgSpec::keyword("xlabel", label()),
        ArgSpec::keyword("ylabel", label()),
        ArgSpec::keyword("width", percent(10.0)),
        ArgSpec::keyword("height", percent(6.0)),
    ])
}
