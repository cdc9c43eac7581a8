/*
 * stream.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Chunked processing of large tabular sources.
 */

//! Streaming adapter.
//!
//! Large sources are read in chunks of `chunk_size` rows and the whole
//! transform chain is applied to each chunk on its own. Filters and limits
//! therefore behave per chunk, and so do `sort` and `groupby`: rows are only
//! ordered or grouped within their chunk. [`render_chunks`] makes that visible
//! by placing a boundary marker between the rendered chunks.

use std::fmt::Write;

use crate::table::{Row, Table};
use crate::transform::{self, TransformOp};

/// Column names plus a row iterator, consumed once.
pub struct RowSource<I> {
    pub columns: Vec<String>,
    pub rows: I,
}

impl<I> RowSource<I> {
    pub fn new(columns: Vec<String>, rows: I) -> Self {
        Self { columns, rows }
    }
}

/// One transformed chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 0-based chunk number
    pub index: usize,
    /// Number of source rows read before this chunk
    pub first_row: usize,
    /// Number of source rows read up to and including this chunk
    pub end_row: usize,
    pub table: Table,
}

#[derive(Debug, Clone)]
pub struct StreamingAdapter {
    ops: Vec<TransformOp>,
    chunk_size: usize,
}

impl StreamingAdapter {
    /// A chunk size of 0 is treated as 1.
    pub fn new(ops: Vec<TransformOp>, chunk_size: usize) -> Self {
        Self {
            ops,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lazily split `source` into transformed chunks.
    pub fn apply<I, E>(&self, source: RowSource<I>) -> ChunkStream<I>
    where
        I: Iterator<Item = Result<Row, E>>,
    {
        ChunkStream {
            columns: source.columns,
            rows: source.rows,
            ops: self.ops.clone(),
            chunk_size: self.chunk_size,
            rows_read: 0,
            next_index: 0,
            done: false,
        }
    }
}

/// Iterator of chunks produced by [`StreamingAdapter::apply`].
///
/// A read error ends the stream after it is yielded.
pub struct ChunkStream<I> {
    columns: Vec<String>,
    rows: I,
    ops: Vec<TransformOp>,
    chunk_size: usize,
    rows_read: usize,
    next_index: usize,
    done: bool,
}

impl<I> ChunkStream<I> {
    /// Columns of the source, before any transform.
    pub fn source_columns(&self) -> &[String] {
        &self.columns
    }

    /// The transform chain applied to an empty table; gives the output columns.
    pub fn empty_output(&self) -> Table {
        transform::apply(Table::new(self.columns.clone()), &self.ops)
    }
}

impl<I, E> Iterator for ChunkStream<I>
where
    I: Iterator<Item = Result<Row, E>>,
{
    type Item = Result<Chunk, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut table = Table::new(self.columns.clone());
        while table.len() < self.chunk_size {
            match self.rows.next() {
                Some(Ok(row)) => table.push_row(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if table.is_empty() {
            self.done = true;
            return None;
        }

        let first_row = self.rows_read;
        self.rows_read += table.len();
        let index = self.next_index;
        self.next_index += 1;

        tracing::debug!(
            chunk = index,
            rows = table.len(),
            "Transforming chunk"
        );

        Some(Ok(Chunk {
            index,
            first_row,
            end_row: self.rows_read,
            table: transform::apply(table, &self.ops),
        }))
    }
}

/// Boundary marker placed after a chunk that ended at source row `end_row`.
pub fn boundary_marker(end_row: usize) -> String {
    format!(
        "<!-- datamd: chunk boundary after row {} (sort/groupby are per chunk) -->",
        end_row
    )
}

/// Render every non-empty chunk as a Markdown table, separated by boundary markers.
///
/// When no chunk has rows, a header-only table is rendered.
pub fn render_chunks<I, E>(mut stream: ChunkStream<I>) -> Result<String, E>
where
    I: Iterator<Item = Result<Row, E>>,
{
    let mut out = String::new();
    let mut previous_end: Option<usize> = None;
    let mut last_columns: Option<Vec<String>> = None;

    for chunk in stream.by_ref() {
        let chunk = chunk?;
        if chunk.table.is_empty() {
            last_columns = Some(chunk.table.columns);
            continue;
        }
        if let Some(end_row) = previous_end {
            let _ = write!(out, "\n{}\n\n", boundary_marker(end_row));
        }
        out.push_str(&chunk.table.to_markdown());
        previous_end = Some(chunk.end_row);
    }

    if previous_end.is_none() {
        let empty = match last_columns {
            Some(columns) => Table::new(columns),
            None => stream.empty_output(),
        };
        out.push_str(&empty.to_markdown());
    }
    Ok(out)
}
