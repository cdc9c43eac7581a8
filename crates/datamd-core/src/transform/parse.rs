/*
 * transform/parse.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Tokenizer and parser for transform chains.
 */

use super::{
    AggFunc, Aggregation, CompareOp, FilterValue, TransformErrorKind, TransformOp,
    TransformSyntaxError,
};

/// One `op:args` piece of a chain, before interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment<'a> {
    /// 1-based position in the chain
    index: usize,
    text: &'a str,
}

/// Parse a transform chain. A blank chain yields no operations.
pub fn parse(input: &str) -> Result<Vec<TransformOp>, TransformSyntaxError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    tokenize(input)?
        .into_iter()
        .map(|segment| {
            parse_segment(segment.text).map_err(|kind| TransformSyntaxError {
                kind,
                index: segment.index,
                segment: segment.text.trim().to_string(),
            })
        })
        .collect()
}

/// Split on `|` outside of double quotes.
fn tokenize(input: &str) -> Result<Vec<Segment<'_>>, TransformSyntaxError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, c) in input.char_indices() {
        match (in_quotes, c) {
            (_, '"') => in_quotes = !in_quotes,
            (true, _) => {}
            (false, '|') => {
                segments.push(Segment {
                    index: segments.len() + 1,
                    text: &input[start..i],
                });
                start = i + 1;
            }
            (false, _) => {}
        }
    }

    let last = Segment {
        index: segments.len() + 1,
        text: &input[start..],
    };
    if in_quotes {
        return Err(TransformSyntaxError {
            kind: TransformErrorKind::UnterminatedQuote,
            index: last.index,
            segment: last.text.trim().to_string(),
        });
    }
    segments.push(last);
    Ok(segments)
}

fn parse_segment(text: &str) -> Result<TransformOp, TransformErrorKind> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TransformErrorKind::EmptySegment);
    }

    let (name, args) = match text.split_once(':') {
        Some((name, args)) => (name.trim(), args.trim()),
        None => (text, ""),
    };
    let name = name.to_ascii_lowercase();

    match name.as_str() {
        "filter" => parse_filter(args),
        "sort" => parse_sort(args),
        "limit" => parse_limit(args),
        "groupby" | "group_by" => parse_groupby(args),
        _ => Err(TransformErrorKind::UnknownOperation(name)),
    }
}

const SYMBOL_OPERATORS: [(&str, CompareOp); 6] = [
    ("==", CompareOp::Eq),
    ("!=", CompareOp::Ne),
    ("<=", CompareOp::Le),
    (">=", CompareOp::Ge),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
];

fn parse_filter(args: &str) -> Result<TransformOp, TransformErrorKind> {
    if args.is_empty() {
        return Err(TransformErrorKind::MissingArgument("filter".to_string()));
    }

    let (at, len, op) = find_operator(args).ok_or(TransformErrorKind::FilterMissingOperator)?;

    let column = args[..at].trim();
    if column.is_empty() {
        return Err(TransformErrorKind::MissingArgument("filter".to_string()));
    }

    let raw_value = args[at + len..].trim();
    if raw_value.is_empty() {
        return Err(TransformErrorKind::FilterMissingValue);
    }

    Ok(TransformOp::Filter {
        column: column.to_string(),
        op,
        value: FilterValue::new(strip_quotes(raw_value)),
    })
}

/// Leftmost operator: a comparison symbol, or `contains` as a separate word.
fn find_operator(args: &str) -> Option<(usize, usize, CompareOp)> {
    for (i, _) in args.char_indices() {
        let rest = &args[i..];
        if let Some((symbol, op)) = SYMBOL_OPERATORS
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol))
        {
            return Some((i, symbol.len(), *op));
        }

        let after_space = args[..i].ends_with(char::is_whitespace);
        let word = rest.get(..8).is_some_and(|w| w.eq_ignore_ascii_case("contains"));
        let ends_word = rest.get(8..).is_some_and(|tail| {
            tail.is_empty() || tail.starts_with(char::is_whitespace)
        });
        if after_space && word && ends_word {
            return Some((i, 8, CompareOp::Contains));
        }
    }
    None
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_sort(args: &str) -> Result<TransformOp, TransformErrorKind> {
    let (descending, column) = match args.strip_prefix('-') {
        Some(column) => (true, column.trim()),
        None => (false, args.strip_prefix('+').unwrap_or(args).trim()),
    };
    if column.is_empty() {
        return Err(TransformErrorKind::MissingArgument("sort".to_string()));
    }
    Ok(TransformOp::Sort {
        column: strip_quotes(column).to_string(),
        descending,
    })
}

fn parse_limit(args: &str) -> Result<TransformOp, TransformErrorKind> {
    if args.is_empty() {
        return Err(TransformErrorKind::MissingArgument("limit".to_string()));
    }
    args.parse::<usize>()
        .map(|n| TransformOp::Limit { n })
        .map_err(|_| TransformErrorKind::InvalidLimit(args.to_string()))
}

fn parse_groupby(args: &str) -> Result<TransformOp, TransformErrorKind> {
    let mut items = split_outside_parens(args).into_iter();
    let column = items.next().map(str::trim).unwrap_or_default();
    if column.is_empty() {
        return Err(TransformErrorKind::MissingArgument("groupby".to_string()));
    }

    let mut aggregations = Vec::new();
    for item in items.map(str::trim).filter(|item| !item.is_empty()) {
        aggregations.push(parse_aggregation(item)?);
    }
    if aggregations.is_empty() {
        aggregations.push(Aggregation {
            func: AggFunc::Count,
            column: None,
        });
    }

    Ok(TransformOp::GroupBy {
        column: column.to_string(),
        aggregations,
    })
}

fn parse_aggregation(item: &str) -> Result<Aggregation, TransformErrorKind> {
    let (name, column) = match item.split_once('(') {
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| TransformErrorKind::UnknownAggregation(item.to_string()))?;
            (name.trim(), Some(inner.trim()).filter(|c| !c.is_empty()))
        }
        None => (item, None),
    };

    let func = AggFunc::from_name(name)
        .ok_or_else(|| TransformErrorKind::UnknownAggregation(name.to_string()))?;
    if column.is_none() && func != AggFunc::Count {
        return Err(TransformErrorKind::MissingArgument(func.name().to_string()));
    }

    Ok(Aggregation {
        func,
        column: column.map(str::to_string),
    })
}

fn split_outside_parens(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(input: &str) -> TransformErrorKind {
        parse(input).unwrap_err().kind
    }

    #[test]
    fn test_blank_chain() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_full_chain() {
        let ops = parse("filter:amount>1000 | SORT:-date|limit:5|groupby:region,sum(amount)").unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(
            ops[0],
            TransformOp::Filter {
                column: "amount".to_string(),
                op: CompareOp::Gt,
                value: FilterValue::new("1000"),
            }
        );
        assert_eq!(
            ops[1],
            TransformOp::Sort {
                column: "date".to_string(),
                descending: true,
            }
        );
        assert_eq!(ops[2], TransformOp::Limit { n: 5 });
        assert_eq!(
            ops[3],
            TransformOp::GroupBy {
                column: "region".to_string(),
                aggregations: vec![Aggregation {
                    func: AggFunc::Sum,
                    column: Some("amount".to_string()),
                }],
            }
        );
    }

    #[test]
    fn test_filter_operators() {
        let op_of = |input: &str| match parse(input).unwrap().remove(0) {
            TransformOp::Filter { op, .. } => op,
            other => panic!("expected filter, got {:?}", other),
        };
        assert_eq!(op_of("filter:a==1"), CompareOp::Eq);
        assert_eq!(op_of("filter:a != 1"), CompareOp::Ne);
        assert_eq!(op_of("filter:a<=1"), CompareOp::Le);
        assert_eq!(op_of("filter:a>=1"), CompareOp::Ge);
        assert_eq!(op_of("filter:a<1"), CompareOp::Lt);
        assert_eq!(op_of("filter:name CONTAINS jo"), CompareOp::Contains);
    }

    #[test]
    fn test_filter_value_quotes_and_pipes() {
        let ops = parse("filter:name==\"a|b\"|limit:1").unwrap();
        assert_eq!(ops.len(), 2);
        match &ops[0] {
            TransformOp::Filter { value, .. } => {
                assert_eq!(value.text, "a|b");
                assert_eq!(value.number, None);
            }
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn test_column_named_like_operator_word() {
        // `contains` only counts as an operator when it stands alone
        match parse("filter:containsx==1").unwrap().remove(0) {
            TransformOp::Filter { column, op, .. } => {
                assert_eq!(column, "containsx");
                assert_eq!(op, CompareOp::Eq);
            }
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn test_groupby_defaults_to_count() {
        match parse("groupby:region").unwrap().remove(0) {
            TransformOp::GroupBy { aggregations, .. } => {
                assert_eq!(aggregations.len(), 1);
                assert_eq!(aggregations[0].output_name(), "count");
            }
            other => panic!("expected groupby, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(kind_of("sort:a||limit:1"), TransformErrorKind::EmptySegment);
        assert_eq!(kind_of("limit:1|"), TransformErrorKind::EmptySegment);
        assert_eq!(
            kind_of("shuffle:a"),
            TransformErrorKind::UnknownOperation("shuffle".to_string())
        );
        assert_eq!(
            kind_of("sort"),
            TransformErrorKind::MissingArgument("sort".to_string())
        );
        assert_eq!(kind_of("filter:amount"), TransformErrorKind::FilterMissingOperator);
        assert_eq!(kind_of("filter:amount>"), TransformErrorKind::FilterMissingValue);
        assert_eq!(
            kind_of("limit:ten"),
            TransformErrorKind::InvalidLimit("ten".to_string())
        );
        assert_eq!(
            kind_of("limit:-1"),
            TransformErrorKind::InvalidLimit("-1".to_string())
        );
        assert_eq!(
            kind_of("groupby:region,median(x)"),
            TransformErrorKind::UnknownAggregation("median".to_string())
        );
        assert_eq!(
            kind_of("groupby:region,sum"),
            TransformErrorKind::MissingArgument("sum".to_string())
        );
        assert_eq!(
            kind_of("filter:name==\"open"),
            TransformErrorKind::UnterminatedQuote
        );
    }

    #[test]
    fn test_error_reports_position() {
        let err = parse("sort:a|bogus").unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.segment, "bogus");
        assert_eq!(
            err.to_string(),
            "unknown operation `bogus` (operation 2: `bogus`)"
        );
    }

    #[test]
    fn test_limit_zero_is_allowed() {
        assert_eq!(parse("limit:0").unwrap(), vec![TransformOp::Limit { n: 0 }]);
    }
}
