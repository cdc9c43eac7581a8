//! Core diagnostic message types.
//!
//! This module defines the fundamental structures for representing diagnostic messages
//! (errors, warnings, info) following tidyverse-style guidelines.

use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::PathBuf;

/// The kind of diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// An error that prevents a directive from producing content
    Error,
    /// A warning that doesn't prevent completion but indicates a problem
    Warning,
    /// Informational message
    Info,
    /// A note providing additional context
    Note,
}

impl DiagnosticKind {
    fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
            DiagnosticKind::Info => "Info",
            DiagnosticKind::Note => "Note",
        }
    }
}

/// How detail items should be presented (tidyverse x/i bullet style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailKind {
    /// Error detail (✖ bullet in tidyverse style)
    Error,
    /// Info detail (i bullet in tidyverse style)
    Info,
    /// Note detail (plain bullet)
    Note,
}

impl DetailKind {
    fn bullet(self) -> &'static str {
        match self {
            DetailKind::Error => "✖",
            DetailKind::Info => "ℹ",
            DetailKind::Note => "•",
        }
    }
}

/// The content of a message or detail item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text content
    Plain(String),
    /// Markdown content
    Markdown(String),
}

impl MessageContent {
    /// Get the raw string content for display
    pub fn as_str(&self) -> &str {
        match self {
            MessageContent::Plain(s) => s,
            MessageContent::Markdown(s) => s,
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Markdown(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Markdown(s.to_string())
    }
}

/// A position in a processed document.
///
/// Lines and columns are 1-based, matching what editors display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// The document the location refers to, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Attach the document path to this location.
    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file.display(), self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// A detail item in a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailItem {
    /// The kind of detail (error, info, note)
    pub kind: DetailKind,
    /// The content of the detail
    pub content: MessageContent,
}

/// A diagnostic message following tidyverse-style structure.
///
/// Structure:
/// 1. **Code**: Optional error code (e.g., "DMD-2-2") for searchability
/// 2. **Title**: Brief error message
/// 3. **Kind**: Error, Warning, Info
/// 4. **Problem**: What went wrong (the "must" or "can't" statement)
/// 5. **Details**: Specific information (bulleted)
/// 6. **Hints**: Optional guidance for fixing (ends with ?)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    /// Optional error code (e.g., "DMD-1-1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Brief title for the error
    pub title: String,

    /// The kind of diagnostic (Error, Warning, Info)
    pub kind: DiagnosticKind,

    /// The problem statement (the "what" - using "must" or "can't")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<MessageContent>,

    /// Specific error details
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub details: Vec<DetailItem>,

    /// Optional hints for fixing (ends with ?)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hints: Vec<MessageContent>,

    /// Where in the document the issue occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl DiagnosticMessage {
    /// Create a new diagnostic message with just a title and kind.
    ///
    /// Note: Consider using [`crate::DiagnosticMessageBuilder`] instead for better structure.
    pub fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            code: None,
            title: title.into(),
            kind,
            problem: None,
            details: Vec::new(),
            hints: Vec::new(),
            location: None,
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

    /// Set the error code.
    ///
    /// Error codes follow the format `DMD-<subsystem>-<number>` (e.g., "DMD-2-2").
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }

    /// Get the documentation URL for this error, if it has an error code.
    pub fn docs_url(&self) -> Option<&str> {
        self.code
            .as_ref()
            .and_then(|code| crate::catalog::get_docs_url(code))
    }

    /// Render this diagnostic message as text following tidyverse style.
    ///
    /// Format:
    /// ```text
    /// Error [DMD-2-2]: title
    ///   at doc.dmd:3:5
    /// Problem statement here
    /// ✖ Error detail
    /// ℹ Info detail
    /// ? Hint
    /// ```
    pub fn to_text(&self) -> String {
        let mut result = String::new();

        let _ = write!(result, "{}", self.kind.label());
        if let Some(code) = &self.code {
            let _ = write!(result, " [{}]", code);
        }
        let _ = writeln!(result, ": {}", self.title);

        if let Some(location) = &self.location {
            let _ = writeln!(result, "  at {}", location);
        }

        if let Some(problem) = &self.problem {
            let _ = writeln!(result, "{}", problem.as_str());
        }

        for detail in &self.details {
            let _ = writeln!(result, "{} {}", detail.kind.bullet(), detail.content.as_str());
        }

        for hint in &self.hints {
            let _ = writeln!(result, "? {}", hint.as_str());
        }

        result
    }

    /// Render this diagnostic message as a JSON value.
    ///
    /// Catalogued codes also carry their `subsystem` and `docs_url`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": self.kind.label().to_lowercase(),
                "title": self.title,
            })
        });
        if let (Some(map), Some(code)) = (value.as_object_mut(), &self.code) {
            if let Some(subsystem) = crate::catalog::get_subsystem(code) {
                map.insert("subsystem".to_string(), subsystem.into());
            }
            if let Some(url) = self.docs_url() {
                map.insert("docs_url".to_string(), url.into());
            }
        }
        value
    }
}

impl std::fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text().trim_end())
    }
}
