/*
 * transform/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Transform chains over tabular data.
 */

//! Transformation engine.
//!
//! A transform chain is written as `op:args` segments separated by `|`,
//! for example `filter:amount>1000|sort:-date|limit:5`. Operations run
//! strictly left to right; a later `sort` re-sorts the current rows, so the
//! last sort in the chain is the primary key.
//!
//! | Operation | Arguments |
//! |-----------|-----------|
//! | `filter`  | `column<op>value` with `==`, `!=`, `<`, `>`, `<=`, `>=`, or `column contains text` |
//! | `sort`    | `column` (ascending) or `-column` (descending) |
//! | `limit`   | non-negative integer |
//! | `groupby` | `column[,agg(column)]*` with `sum`, `count`, `avg`, `min`, `max` |

mod apply;
mod parse;

pub use apply::apply;
pub use parse::parse;

use std::fmt;

use thiserror::Error;

/// One step of a transform chain.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Filter {
        column: String,
        op: CompareOp,
        value: FilterValue,
    },
    Sort {
        column: String,
        descending: bool,
    },
    Limit {
        n: usize,
    },
    GroupBy {
        column: String,
        aggregations: Vec<Aggregation>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Contains => "contains",
        };
        f.write_str(s)
    }
}

/// The right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    pub text: String,
    pub number: Option<f64>,
}

impl FilterValue {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let number = text.trim().parse::<f64>().ok().filter(|n| n.is_finite());
        Self { text, number }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Some(AggFunc::Sum),
            "count" => Some(AggFunc::Count),
            "avg" | "mean" => Some(AggFunc::Avg),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
        }
    }
}

/// `count`, or `func(column)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub func: AggFunc,
    pub column: Option<String>,
}

impl Aggregation {
    /// Name of the output column: `count` for a plain count, `<func>_<column>` otherwise.
    pub fn output_name(&self) -> String {
        match &self.column {
            Some(column) => format!("{}_{}", self.func.name(), column),
            None => self.func.name().to_string(),
        }
    }
}

/// A transform chain that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (operation {index}: `{segment}`)")]
pub struct TransformSyntaxError {
    pub kind: TransformErrorKind,
    /// 1-based position of the offending operation in the chain.
    pub index: usize,
    pub segment: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformErrorKind {
    #[error("empty operation")]
    EmptySegment,

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(String),

    #[error("filter has no comparison operator")]
    FilterMissingOperator,

    #[error("filter has no value to compare against")]
    FilterMissingValue,

    #[error("limit must be a non-negative integer, found `{0}`")]
    InvalidLimit(String),

    #[error("unknown aggregation `{0}`")]
    UnknownAggregation(String),

    #[error("unterminated quote")]
    UnterminatedQuote,
}
