//! Error types for datamd-core

use std::path::PathBuf;

use datamd_config::ConfigError;
use thiserror::Error;

use crate::transform::TransformSyntaxError;

/// A subject path that could not be turned into a readable file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path `{raw}`: {reason}")]
    Invalid { raw: String, reason: String },

    #[error("file not found: `{raw}`")]
    NotFound { raw: String },

    #[error("`{raw}` resolves outside the document directory")]
    Traversal { raw: String },

    #[error("`{raw}` is not a regular file")]
    NotAFile { raw: String },

    #[error("`{raw}` is {size} bytes, over the limit of {limit} bytes")]
    TooLarge { raw: String, size: u64, limit: u64 },

    #[error("files with extension `{extension}` are not allowed (`{raw}`)")]
    ExtensionNotAllowed { raw: String, extension: String },
}

impl PathError {
    pub fn code(&self) -> &'static str {
        match self {
            PathError::Invalid { .. } => "DMD-2-1",
            PathError::NotFound { .. } => "DMD-2-2",
            PathError::Traversal { .. } => "DMD-2-3",
            PathError::NotAFile { .. } => "DMD-2-4",
            PathError::TooLarge { .. } => "DMD-2-5",
            PathError::ExtensionNotAllowed { .. } => "DMD-2-6",
        }
    }
}

/// A directive argument that has no usable value after sanitization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("argument `{name}` {reason}")]
pub struct SanitizationError {
    pub name: String,
    pub reason: String,
}

impl SanitizationError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a directive handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode `{}`: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("{0}")]
    Transform(#[from] TransformSyntaxError),

    #[error("`{command}` is disabled by configuration (features.{feature})")]
    FeatureDisabled {
        command: String,
        feature: &'static str,
    },

    #[error("no decoder registered for `{0}`")]
    NoDecoder(String),

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn decode(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::Transform(_) => "DMD-4-1",
            HandlerError::FeatureDisabled { .. } => "DMD-5-2",
            _ => "DMD-5-1",
        }
    }
}

/// Syntax problems in a directive of a registered command.
///
/// The directive text is left in the output unchanged; this only feeds the
/// diagnostics channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("missing quoted subject path after `{command}`")]
    MissingSubjectPath { command: String },

    #[error("unterminated quoted string")]
    UnterminatedQuote,

    #[error("directive is not closed with `}}}}`")]
    Unclosed,

    #[error("unexpected `{found}` inside an argument")]
    StrayCharacter { found: char },

    #[error("keyword argument has an empty name")]
    EmptyKey,

    #[error("invalid keyword name `{0}`")]
    InvalidKey(String),

    #[error("keyword argument `{0}` has no value")]
    EmptyValue(String),
}

/// Everything that can stop a single directive from producing content.
///
/// Each variant renders as its own inline error block.
#[derive(Error, Debug)]
pub enum DirectiveFailure {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Sanitization(#[from] SanitizationError),

    #[error(transparent)]
    Transform(TransformSyntaxError),

    #[error(transparent)]
    Handler(HandlerError),
}

impl From<HandlerError> for DirectiveFailure {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Transform(e) => DirectiveFailure::Transform(e),
            other => DirectiveFailure::Handler(other),
        }
    }
}

impl From<TransformSyntaxError> for DirectiveFailure {
    fn from(err: TransformSyntaxError) -> Self {
        DirectiveFailure::Transform(err)
    }
}

impl DirectiveFailure {
    /// Label used in the inline error block (`DataMD <kind> error`).
    pub fn kind(&self) -> &'static str {
        match self {
            DirectiveFailure::Path(_) => "path",
            DirectiveFailure::Sanitization(_) => "argument",
            DirectiveFailure::Transform(_) => "transform",
            DirectiveFailure::Handler(_) => "handler",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DirectiveFailure::Path(e) => e.code(),
            DirectiveFailure::Sanitization(_) => "DMD-3-2",
            DirectiveFailure::Transform(_) => "DMD-4-1",
            DirectiveFailure::Handler(e) => e.code(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DataMdError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl DataMdError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataMdError>;
