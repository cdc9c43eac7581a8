/*
 * handler.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The directive handler interface and registry.
 */

//! Directive handlers.
//!
//! Every command (`csv`, `json`, `video`, ...) is a [`DirectiveHandler`]
//! registered by name in a [`HandlerRegistry`]. By the time a handler runs,
//! its arguments have been sanitized against its [`CommandSignature`] and its
//! subject path has passed every security check.

use datamd_config::{Configuration, Feature};
use serde::{Deserialize, Serialize};

use crate::error::HandlerError;
use crate::path::ResolvedPath;
use crate::sanitize::{CommandSignature, SanitizedArgs};

/// Generated Markdown that replaces a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub markdown: String,
}

impl RenderedBlock {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
        }
    }
}

/// Everything a handler gets to work with.
pub struct HandlerRequest<'a> {
    pub command: &'a str,
    pub path: &'a ResolvedPath,
    /// The subject path as written in the document
    pub raw_path: &'a str,
    pub args: &'a SanitizedArgs,
    pub config: &'a Configuration,
}

/// Trait for directive handlers.
pub trait DirectiveHandler: Send + Sync {
    /// The command name (e.g., "csv", "json")
    fn name(&self) -> &str;

    /// Accepted arguments. Defaults may depend on configuration.
    fn signature(&self, _config: &Configuration) -> CommandSignature {
        CommandSignature::default()
    }

    /// A feature that must be enabled for this command to run.
    fn required_feature(&self) -> Option<Feature> {
        None
    }

    /// Whether results may be stored in the cache.
    fn cacheable(&self) -> bool {
        true
    }

    /// Configuration that shapes the output of this command for `path`.
    ///
    /// Hashed into the cache key next to the sanitized arguments.
    fn cache_salt(&self, _config: &Configuration, _path: &ResolvedPath) -> String {
        String::new()
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError>;
}

/// Handlers by command name. Registering a name again replaces the handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn DirectiveHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in handlers and placeholders for external decoders.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::handlers::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, handler: Box<dyn DirectiveHandler>) {
        let name = handler.name().to_string();
        match self.handlers.iter().position(|h| h.name() == name) {
            Some(idx) => {
                tracing::debug!(command = %name, "Replacing directive handler");
                self.handlers[idx] = handler;
            }
            None => self.handlers.push(handler),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn DirectiveHandler> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static str);

    impl DirectiveHandler for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn handle(&self, _request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
            Ok(RenderedBlock::new(self.1))
        }
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Fixed("a", "one")));
        registry.register(Box::new(Fixed("b", "two")));
        registry.register(Box::new(Fixed("a", "three")));

        assert_eq!(registry.names(), ["a", "b"]);
        assert!(registry.contains("b"));
        assert!(!registry.contains("c"));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        for name in [
            "csv",
            "json",
            "video",
            "xlsx",
            "xls",
            "xlsm",
            "ods",
            "pdf",
            "pdf_table",
            "image_ocr",
            "video_thumb",
            "chart",
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
    }
}
