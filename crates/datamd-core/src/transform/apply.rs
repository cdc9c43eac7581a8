/*
 * transform/apply.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Evaluation of parsed transform chains.
 */

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{AggFunc, Aggregation, CompareOp, FilterValue, TransformOp};
use crate::table::{Cell, Row, Table};

/// Apply `ops` to `table`, left to right.
///
/// Operations never fail at this point: a filter on an unknown column keeps
/// no rows, a sort on an unknown column keeps the current order.
pub fn apply(table: Table, ops: &[TransformOp]) -> Table {
    ops.iter().fold(table, |table, op| apply_one(table, op))
}

fn apply_one(mut table: Table, op: &TransformOp) -> Table {
    match op {
        TransformOp::Filter { column, op, value } => {
            let idx = table.column_index(column);
            table.rows.retain(|row| {
                idx.and_then(|i| row.get(i))
                    .and_then(|cell| cell.as_ref())
                    .is_some_and(|cell| matches(cell, *op, value))
            });
            table
        }
        TransformOp::Sort { column, descending } => {
            if let Some(idx) = table.column_index(column) {
                table
                    .rows
                    .sort_by(|a, b| compare_rows(a, b, idx, *descending));
            }
            table
        }
        TransformOp::Limit { n } => {
            table.rows.truncate(*n);
            table
        }
        TransformOp::GroupBy {
            column,
            aggregations,
        } => group_by(&table, column, aggregations),
    }
}

fn matches(cell: &Cell, op: CompareOp, value: &FilterValue) -> bool {
    if op == CompareOp::Contains {
        return cell
            .text
            .to_lowercase()
            .contains(&value.text.to_lowercase());
    }

    let ordering = match (cell.number, value.number) {
        (Some(a), Some(b)) => match a.partial_cmp(&b) {
            Some(ordering) => ordering,
            None => return false,
        },
        _ => cell.text.as_str().cmp(value.text.as_str()),
    };

    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Contains => false,
    }
}

/// Absent values sort last in both directions.
fn compare_rows(a: &Row, b: &Row, idx: usize, descending: bool) -> Ordering {
    let a = a.get(idx).and_then(|c| c.as_ref());
    let b = b.get(idx).and_then(|c| c.as_ref());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) if descending => b.compare(a),
        (Some(a), Some(b)) => a.compare(b),
    }
}

fn group_by(table: &Table, column: &str, aggregations: &[Aggregation]) -> Table {
    let mut columns = vec![column.to_string()];
    columns.extend(aggregations.iter().map(Aggregation::output_name));
    let mut out = Table::new(columns);

    let Some(key_idx) = table.column_index(column) else {
        return out;
    };

    // Groups keyed by the key cell's text; first-seen cell represents the group.
    let mut groups: Vec<(Cell, Vec<&Row>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for row in &table.rows {
        let Some(key) = row.get(key_idx).and_then(|c| c.as_ref()) else {
            continue;
        };
        match index.get(key.text.as_str()) {
            Some(&idx) => groups[idx].1.push(row),
            None => {
                index.insert(key.text.as_str(), groups.len());
                groups.push((key.clone(), vec![row]));
            }
        }
    }
    groups.sort_by(|(a, _), (b, _)| a.compare(b));

    for (key, members) in groups {
        let mut row: Row = vec![Some(key)];
        for aggregation in aggregations {
            row.push(aggregate(table, &members, aggregation));
        }
        out.push_row(row);
    }
    out
}

fn aggregate(table: &Table, members: &[&Row], aggregation: &Aggregation) -> Option<Cell> {
    let Some(column) = &aggregation.column else {
        return Some(Cell::from_number(members.len() as f64));
    };
    let idx = table.column_index(column);
    let cells = members
        .iter()
        .filter_map(|row| idx.and_then(|i| row.get(i)).and_then(|c| c.as_ref()));

    if aggregation.func == AggFunc::Count {
        return Some(Cell::from_number(cells.count() as f64));
    }

    let numbers: Vec<f64> = cells.filter_map(|c| c.number).collect();
    if numbers.is_empty() {
        return None;
    }
    let value = match aggregation.func {
        AggFunc::Sum => numbers.iter().sum::<f64>(),
        AggFunc::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        AggFunc::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        AggFunc::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggFunc::Count => numbers.len() as f64,
    };
    Some(Cell::from_number(value))
}
