/*
 * table.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * In-memory tabular data and its Markdown rendering.
 */

use std::cmp::Ordering;
use std::fmt::Write;

/// A single value of a table.
///
/// The source text is kept for rendering; `number` is its numeric reading
/// when the text parses as a finite number.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub text: String,
    pub number: Option<f64>,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let number = parse_number(&text);
        Self { text, number }
    }

    /// A cell computed from a number (aggregates).
    pub fn from_number(value: f64) -> Self {
        Self {
            text: format_number(value),
            number: Some(value),
        }
    }

    /// Numeric comparison when both cells are numbers, text comparison otherwise.
    pub fn compare(&self, other: &Cell) -> Ordering {
        match (self.number, other.number) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => self.text.cmp(&other.text),
        }
    }
}

/// A row; `None` marks an absent value.
pub type Row = Vec<Option<Cell>>;

/// Rows with named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`, if both exist and the value is present.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Render as a GitHub-flavoured Markdown pipe table.
    ///
    /// A table without columns renders as an emphasized "no data" line.
    pub fn to_markdown(&self) -> String {
        if self.columns.is_empty() {
            return "*No data*\n".to_string();
        }

        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| escape_cell(c)).collect();
        let _ = writeln!(out, "| {} |", header.join(" | "));
        let rule: Vec<&str> = self.columns.iter().map(|_| "---").collect();
        let _ = writeln!(out, "| {} |", rule.join(" | "));

        for row in &self.rows {
            let cells: Vec<String> = (0..self.columns.len())
                .map(|i| {
                    row.get(i)
                        .and_then(|c| c.as_ref())
                        .map(|c| escape_cell(&c.text))
                        .unwrap_or_default()
                })
                .collect();
            let _ = writeln!(out, "| {} |", cells.join(" | "));
        }
        out
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
