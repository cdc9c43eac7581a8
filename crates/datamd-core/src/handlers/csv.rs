/*
 * handlers/csv.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The `csv` command.
 */

use datamd_config::Configuration;

use super::{transform_arg, transform_ops};
use crate::error::HandlerError;
use crate::handler::{DirectiveHandler, HandlerRequest, RenderedBlock};
use crate::path::ResolvedPath;
use crate::sanitize::{ArgKind, ArgSpec, CommandSignature};
use crate::stream::{RowSource, StreamingAdapter, render_chunks};
use crate::table::{Cell, Row, Table};
use crate::transform;

/// Renders a delimited text file as a Markdown table.
///
/// Usage: `{{ csv "data.csv" }}`, `{{ csv "data.tsv" tab }}`,
/// `{{ csv "data.csv" sep=; transform="sort:-amount|limit:10" }}`
///
/// Files above the streaming threshold are read and transformed in chunks.
pub struct CsvHandler;

impl DirectiveHandler for CsvHandler {
    fn name(&self) -> &str {
        "csv"
    }

    fn signature(&self, config: &Configuration) -> CommandSignature {
        let default = config
            .processing
            .default_csv_separator
            .chars()
            .next()
            .unwrap_or(',');
        CommandSignature::new(vec![
            ArgSpec::positional("separator", 0, ArgKind::Delimiter { default }).alias("sep"),
            transform_arg(),
        ])
    }

    /// Chunk boundaries appear in the output only when the file is streamed.
    fn cache_salt(&self, config: &Configuration, path: &ResolvedPath) -> String {
        let performance = &config.performance;
        if performance.should_stream(path.size_bytes()) {
            format!("stream:{}", performance.chunk_size)
        } else {
            "whole".to_string()
        }
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
        let ops = transform_ops(request.args)?;
        let delimiter = request
            .args
            .text("separator")
            .and_then(|s| s.bytes().next())
            .unwrap_or(b',');
        let path = request.path.absolute_path();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| HandlerError::decode(path, e))?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| HandlerError::decode(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let performance = &request.config.performance;
        let rows = reader
            .into_records()
            .map(|record| record.map(|r| record_to_row(&r)));

        if performance.should_stream(request.path.size_bytes()) {
            tracing::debug!(
                path = %path.display(),
                chunk_size = performance.chunk_size,
                "Streaming CSV"
            );
            let adapter = StreamingAdapter::new(ops, performance.chunk_size);
            let markdown = render_chunks(adapter.apply(RowSource::new(columns, rows)))
                .map_err(|e| HandlerError::decode(path, e))?;
            return Ok(RenderedBlock::new(markdown));
        }

        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row.map_err(|e| HandlerError::decode(path, e))?);
        }
        Ok(RenderedBlock::new(transform::apply(table, &ops).to_markdown()))
    }
}

/// Empty fields are absent values.
fn record_to_row(record: &csv::StringRecord) -> Row {
    record
        .iter()
        .map(|field| (!field.is_empty()).then(|| Cell::new(field)))
        .collect()
}
