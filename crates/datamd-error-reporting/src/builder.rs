//! Builder API for diagnostic messages.
//!
//! The builder encodes the tidyverse structure: a short title, one problem
//! statement, a handful of details, and optional hints.

use crate::diagnostic::{
    DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage, MessageContent, SourceLocation,
};

/// Builder for [`DiagnosticMessage`].
///
/// # Example
///
/// ```
/// use datamd_error_reporting::DiagnosticMessageBuilder;
///
/// let error = DiagnosticMessageBuilder::error("Transform syntax error")
///     .with_code("DMD-4-1")
///     .problem("`limit` requires a non-negative integer")
///     .add_detail("Found `limit:ten`")
///     .add_hint("Use a number such as `limit:10`?")
///     .build();
///
/// assert_eq!(error.code.as_deref(), Some("DMD-4-1"));
/// assert_eq!(error.details.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DiagnosticMessageBuilder {
    message: DiagnosticMessage,
}

impl DiagnosticMessageBuilder {
    fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            message: DiagnosticMessage::new(kind, title),
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Info, title)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.message.code = Some(code.into());
        self
    }

    /// Set the problem statement. Calling this twice keeps the last one.
    pub fn problem(mut self, problem: impl Into<MessageContent>) -> Self {
        self.message.problem = Some(problem.into());
        self
    }

    /// Add an error detail (✖ bullet).
    pub fn add_detail(self, detail: impl Into<MessageContent>) -> Self {
        self.push_detail(DetailKind::Error, detail)
    }

    /// Add an info detail (ℹ bullet).
    pub fn add_info(self, detail: impl Into<MessageContent>) -> Self {
        self.push_detail(DetailKind::Info, detail)
    }

    /// Add a note detail (• bullet).
    pub fn add_note(self, detail: impl Into<MessageContent>) -> Self {
        self.push_detail(DetailKind::Note, detail)
    }

    pub fn add_hint(mut self, hint: impl Into<MessageContent>) -> Self {
        self.message.hints.push(hint.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.message.location = Some(location);
        self
    }

    pub fn build(self) -> DiagnosticMessage {
        self.message
    }

    fn push_detail(mut self, kind: DetailKind, content: impl Into<MessageContent>) -> Self {
        self.message.details.push(DetailItem {
            kind,
            content: content.into(),
        });
        self
    }
}
