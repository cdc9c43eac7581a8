/*
 * handlers/json.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The `json` command.
 */

use datamd_config::Configuration;
use serde_json::{Map, Value};

use super::{transform_arg, transform_ops};
use crate::error::HandlerError;
use crate::handler::{DirectiveHandler, HandlerRequest, RenderedBlock};
use crate::sanitize::{ArgKind, ArgSpec, CommandSignature};
use crate::table::{Cell, Table};
use crate::transform;

/// Renders JSON data.
///
/// - an array of objects becomes a table, nested objects flattened into
///   dotted column names (`address.city`)
/// - any other array becomes a single `value` column
/// - an object becomes a fenced `json` block, or a one-row table with `flatten`
/// - anything else is shown inline as `JSON content: <value>`
pub struct JsonHandler;

impl DirectiveHandler for JsonHandler {
    fn name(&self) -> &str {
        "json"
    }

    fn signature(&self, _config: &Configuration) -> CommandSignature {
        CommandSignature::new(vec![
            ArgSpec::positional("flatten", 0, ArgKind::Bool { default: false }),
            transform_arg(),
        ])
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
        let ops = transform_ops(request.args)?;
        let flatten = request.args.bool("flatten").unwrap_or(false);
        let path = request.path.absolute_path();

        let text = std::fs::read_to_string(path).map_err(|source| HandlerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| HandlerError::decode(path, e))?;

        let markdown = match value {
            Value::Array(items) if items.iter().all(Value::is_object) => {
                let records: Vec<Map<String, Value>> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                transform::apply(records_to_table(&records), &ops).to_markdown()
            }
            Value::Array(items) => {
                let mut table = Table::new(vec!["value".to_string()]);
                for item in &items {
                    table.push_row(vec![value_to_cell(item)]);
                }
                transform::apply(table, &ops).to_markdown()
            }
            Value::Object(map) if flatten => {
                transform::apply(records_to_table(&[map]), &ops).to_markdown()
            }
            Value::Object(map) => {
                let pretty = serde_json::to_string_pretty(&Value::Object(map))
                    .map_err(|e| HandlerError::decode(path, e))?;
                format!("```json\n{}\n```\n", pretty)
            }
            other => format!("JSON content: {}\n", scalar_text(&other)),
        };
        Ok(RenderedBlock::new(markdown))
    }
}

/// Columns in order of first appearance across all records.
fn records_to_table(records: &[Map<String, Value>]) -> Table {
    let flat: Vec<Vec<(String, Value)>> = records
        .iter()
        .map(|record| {
            let mut out = Vec::new();
            flatten_into("", record, &mut out);
            out
        })
        .collect();

    let mut columns: Vec<String> = Vec::new();
    for record in &flat {
        for (key, _) in record {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = Table::new(columns);
    for record in flat {
        let mut row = vec![None; table.columns.len()];
        for (key, value) in record {
            if let Some(idx) = table.column_index(&key) {
                row[idx] = value_to_cell(&value);
            }
        }
        table.push_row(row);
    }
    table
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(&name, inner, out),
            other => out.push((name, other.clone())),
        }
    }
}

/// `null` is absent; arrays and empty objects are shown as compact JSON.
fn value_to_cell(value: &Value) -> Option<Cell> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cell::new(s.as_str())),
        Value::Number(n) => Some(Cell::new(n.to_string())),
        Value::Bool(b) => Some(Cell::new(b.to_string())),
        other => Some(Cell::new(other.to_string())),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
