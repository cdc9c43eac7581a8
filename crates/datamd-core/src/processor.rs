/*
 * processor.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Expands directives in a document.
 */

//! The document processor.
//!
//! A [`Processor`] owns everything needed to expand a document: the
//! configuration snapshot, the handler registry, the optional cache and a
//! worker pool. Processing a document happens in three passes:
//!
//! 1. every line is scanned for directives of registered commands
//! 2. the directives are executed on the pool
//! 3. the output is assembled line by line in document order
//!
//! Failures never abort a document. A failing directive is replaced by an
//! inline error block and reported as an error diagnostic; a malformed one is
//! left as written and reported as a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use datamd_config::Configuration;
use datamd_error_reporting::{DiagnosticMessage, DiagnosticMessageBuilder, SourceLocation, get_error_info};
use rayon::prelude::*;
use serde::Serialize;

use crate::cache::{CacheKey, CacheManager};
use crate::directive::{DirectiveInvocation, LinePart, scan_line};
use crate::error::{DataMdError, DirectiveError, DirectiveFailure, HandlerError, Result};
use crate::handler::{HandlerRegistry, HandlerRequest, RenderedBlock};
use crate::path;
use crate::sanitize::sanitize;

/// Counters for one processed document (or a batch, via [`ProcessingStats::merge`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Well-formed directives found
    pub directives: usize,
    pub cache_hits: usize,
    pub handler_invocations: usize,
    /// Directives replaced by an inline error block
    pub failures: usize,
    /// Malformed directives left unchanged
    pub invalid: usize,
}

impl ProcessingStats {
    pub fn merge(&mut self, other: &ProcessingStats) {
        self.directives += other.directives;
        self.cache_hits += other.cache_hits;
        self.handler_invocations += other.handler_invocations;
        self.failures += other.failures;
        self.invalid += other.invalid;
    }
}

/// Result of processing one document.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub text: String,
    pub diagnostics: Vec<DiagnosticMessage>,
    pub stats: ProcessingStats,
}

impl ProcessOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(DiagnosticMessage::is_error)
    }
}

/// A directive waiting to run.
struct Job<'a> {
    invocation: &'a DirectiveInvocation,
    /// The directive as written
    source: &'a str,
    location: SourceLocation,
}

#[derive(Default)]
struct Outcome {
    markdown: String,
    diagnostics: Vec<DiagnosticMessage>,
    cache_hit: bool,
    invoked: bool,
    failed: bool,
}

pub struct Processor {
    config: Arc<Configuration>,
    registry: HandlerRegistry,
    cache: Option<CacheManager>,
    pool: rayon::ThreadPool,
}

impl Processor {
    /// Create a processor with the built-in handlers.
    ///
    /// The cache is opened from `config.cache`; if its directory cannot be
    /// created the processor runs without a cache.
    pub fn new(config: impl Into<Arc<Configuration>>) -> Result<Self> {
        let config = config.into();
        let cache = match CacheManager::from_config(&config.cache) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("Cache disabled: {}", e);
                None
            }
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.performance.max_workers)
            .thread_name(|i| format!("datamd-worker-{}", i))
            .build()
            .map_err(|e| DataMdError::WorkerPool(e.to_string()))?;

        Ok(Self {
            config,
            registry: HandlerRegistry::with_builtins(),
            cache,
            pool,
        })
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cache(mut self, cache: Option<CacheManager>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    /// Expand every directive in `text`.
    ///
    /// Subject paths are resolved against `base_dir`. `source` only labels
    /// diagnostics.
    pub fn process(&self, text: &str, base_dir: &Path, source: Option<&Path>) -> ProcessOutput {
        let locate = |line: usize, column: usize| {
            let location = SourceLocation::new(line, column);
            match source {
                Some(file) => location.in_file(file),
                None => location,
            }
        };

        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let scanned: Vec<Vec<LinePart<'_>>> = lines
            .iter()
            .map(|&line| {
                if line.contains("{{") {
                    scan_line(line, |command| self.registry.contains(command))
                } else {
                    vec![LinePart::Text(line)]
                }
            })
            .collect();

        let mut diagnostics = Vec::new();
        let mut stats = ProcessingStats::default();
        let mut jobs = Vec::new();

        for (idx, (&line, parts)) in lines.iter().zip(&scanned).enumerate() {
            for part in parts {
                match part {
                    LinePart::Text(_) => {}
                    LinePart::Directive { span, invocation } => jobs.push(Job {
                        invocation,
                        source: &line[span.clone()],
                        location: locate(idx + 1, column_of(line, span.start)),
                    }),
                    LinePart::Malformed { span, error } => {
                        stats.invalid += 1;
                        diagnostics.push(malformed_warning(
                            &line[span.clone()],
                            error,
                            locate(idx + 1, column_of(line, span.start)),
                        ));
                    }
                }
            }
        }
        stats.directives = jobs.len();

        tracing::debug!(
            directives = stats.directives,
            invalid = stats.invalid,
            "Scanned document"
        );

        let base_dir = base_dir.to_path_buf();
        let outcomes: Vec<Outcome> = self
            .pool
            .install(|| jobs.par_iter().map(|job| self.run(job, &base_dir)).collect());

        let mut outcomes = outcomes.into_iter();
        let mut output = String::with_capacity(text.len());
        for (&line, parts) in lines.iter().zip(&scanned) {
            for part in parts {
                match part {
                    LinePart::Text(piece) => output.push_str(piece),
                    LinePart::Malformed { span, .. } => output.push_str(&line[span.clone()]),
                    LinePart::Directive { .. } => {
                        let Some(outcome) = outcomes.next() else { continue };
                        stats.cache_hits += usize::from(outcome.cache_hit);
                        stats.handler_invocations += usize::from(outcome.invoked);
                        stats.failures += usize::from(outcome.failed);
                        output.push_str(&outcome.markdown);
                        diagnostics.extend(outcome.diagnostics);
                    }
                }
            }
        }

        ProcessOutput {
            text: output,
            diagnostics,
            stats,
        }
    }

    /// Read and process a document, resolving paths against its directory.
    pub fn process_file(&self, path: &Path) -> Result<ProcessOutput> {
        let text = std::fs::read_to_string(path).map_err(|e| DataMdError::io(path, e))?;
        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tracing::debug!(path = %path.display(), "Processing document");
        Ok(self.process(&text, &base_dir, Some(path)))
    }

    fn run(&self, job: &Job<'_>, base_dir: &Path) -> Outcome {
        let mut outcome = Outcome::default();
        match self.execute(job, base_dir, &mut outcome) {
            Ok(block) => {
                let markdown = block.markdown;
                outcome.markdown = match markdown.strip_suffix('\n') {
                    Some(trimmed) => trimmed.to_string(),
                    None => markdown,
                };
            }
            Err(failure) => {
                tracing::debug!(
                    directive = job.source,
                    kind = failure.kind(),
                    "Directive failed: {}",
                    failure
                );
                outcome.failed = true;
                outcome.markdown = error_block(job.source, &failure);
                outcome
                    .diagnostics
                    .push(failure_diagnostic(job.source, &failure, job.location.clone()));
            }
        }
        outcome
    }

    fn execute(
        &self,
        job: &Job<'_>,
        base_dir: &Path,
        outcome: &mut Outcome,
    ) -> std::result::Result<RenderedBlock, DirectiveFailure> {
        let invocation = job.invocation;
        let command = invocation.command.as_str();
        let handler = self
            .registry
            .get(command)
            .ok_or_else(|| HandlerError::Other(format!("no handler registered for `{}`", command)))?;

        if let Some(feature) = handler.required_feature() {
            if !self.config.features.is_enabled(feature) {
                return Err(HandlerError::FeatureDisabled {
                    command: command.to_string(),
                    feature: feature.key(),
                }
                .into());
            }
        }

        let (args, adjustments) = sanitize(
            &handler.signature(&self.config),
            &invocation.positional_args,
            &invocation.keyword_args,
        )?;
        for adjustment in adjustments {
            outcome.diagnostics.push(
                DiagnosticMessageBuilder::warning(catalog_title("DMD-3-1", "Argument Adjusted"))
                    .with_code("DMD-3-1")
                    .problem(format!("In `{}`, {}", job.source, adjustment))
                    .with_location(job.location.clone())
                    .build(),
            );
        }

        let resolved = path::resolve(&invocation.raw_path, base_dir, &self.config.security)?;

        let key = handler
            .cacheable()
            .then(|| {
                let salt = handler.cache_salt(&self.config, &resolved);
                CacheKey::new(&resolved, command, &args, &salt)
            });
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(block) = cache.get(key) {
                outcome.cache_hit = true;
                return Ok(block);
            }
        }

        outcome.invoked = true;
        let block = handler.handle(&HandlerRequest {
            command,
            path: &resolved,
            raw_path: &invocation.raw_path,
            args: &args,
            config: &self.config,
        })?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Err(e) = cache.set(key, &block) {
                tracing::warn!(directive = job.source, "Could not store cache entry: {}", e);
            }
        }
        Ok(block)
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("registry", &self.registry)
            .field("cache", &self.cache.as_ref().map(CacheManager::directory))
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

/// The inline replacement for a directive that failed.
pub fn error_block(directive: &str, failure: &DirectiveFailure) -> String {
    format!(
        "> **DataMD {} error** [{}] in `{}`: {}",
        failure.kind(),
        failure.code(),
        directive,
        failure
    )
}

fn failure_diagnostic(
    directive: &str,
    failure: &DirectiveFailure,
    location: SourceLocation,
) -> DiagnosticMessage {
    let code = failure.code();
    DiagnosticMessageBuilder::error(catalog_title(code, "Directive Failed"))
        .with_code(code)
        .problem(format!("`{}` could not be expanded", directive))
        .add_detail(failure.to_string())
        .with_location(location)
        .build()
}

fn malformed_warning(text: &str, error: &DirectiveError, location: SourceLocation) -> DiagnosticMessage {
    let mut builder = DiagnosticMessageBuilder::warning(catalog_title("DMD-1-1", "Malformed Directive"))
        .with_code("DMD-1-1")
        .problem(format!("`{}` is not a valid directive", text))
        .add_detail(error.to_string())
        .add_note("The text was left unchanged");
    if matches!(error, DirectiveError::MissingSubjectPath { .. }) {
        builder = builder.add_hint("Put the subject path in double quotes, as in `{{ csv \"data.csv\" }}`?");
    }
    builder.with_location(location).build()
}

fn catalog_title(code: &str, fallback: &str) -> String {
    get_error_info(code)
        .map(|info| info.title.clone())
        .unwrap_or_else(|| fallback.to_string())
}

/// 1-based character column of a byte offset.
fn column_of(line: &str, byte: usize) -> usize {
    line[..byte].chars().count() + 1
}
