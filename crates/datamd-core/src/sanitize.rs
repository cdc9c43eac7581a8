/*
 * sanitize.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Sanitization of directive arguments.
 */

//! Argument sanitization.
//!
//! Each command declares a [`CommandSignature`]: the arguments it accepts,
//! where they may appear, and how their raw text is cleaned up. Sanitizing
//! never fails for a bad value; it falls back to the argument's default and
//! records an [`Adjustment`] so the caller can warn about it. The one hard
//! failure is a required identifier that is empty after cleaning.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SanitizationError;

/// Which characters a text argument keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharFilter {
    /// Everything except control characters
    Printable,
    /// `[A-Za-z0-9_.-]`
    Identifier,
    /// Only the listed characters
    Only(String),
}

impl CharFilter {
    fn keeps(&self, c: char) -> bool {
        match self {
            CharFilter::Printable => !c.is_control(),
            CharFilter::Identifier => c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'),
            CharFilter::Only(allowed) => allowed.contains(c),
        }
    }
}

/// How an argument's raw text is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgKind {
    Int {
        min: i64,
        max: i64,
        default: i64,
    },
    Float {
        min: f64,
        max: f64,
        default: f64,
    },
    Bool {
        default: bool,
    },
    /// Free text; absent when no default is given and nothing was supplied.
    Text {
        max_len: usize,
        filter: CharFilter,
        default: Option<String>,
    },
    /// Identifier-safe text; `required` makes an empty result an error.
    Identifier {
        max_len: usize,
        required: bool,
    },
    /// One of a fixed set of words (case-insensitive).
    Choice {
        options: Vec<String>,
        default: String,
    },
    /// A single delimiter character; `tab` and `\t` mean a tab.
    Delimiter {
        default: char,
    },
    /// A worksheet index (non-negative integer) or name of at most 31 characters.
    SheetRef,
    /// `all`, or a page count between 1 and `max`.
    Pages {
        max: i64,
    },
}

/// One accepted argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    /// Position among the bare arguments, if it may be given positionally
    pub position: Option<usize>,
    /// Extra keyword names accepted for this argument
    pub aliases: Vec<String>,
    pub kind: ArgKind,
}

impl ArgSpec {
    /// An argument that may be given positionally at `position` or by name.
    pub fn positional(name: &str, position: usize, kind: ArgKind) -> Self {
        Self {
            name: name.to_string(),
            position: Some(position),
            aliases: Vec::new(),
            kind,
        }
    }

    /// An argument that can only be given as `name=value`.
    pub fn keyword(name: &str, kind: ArgKind) -> Self {
        Self {
            name: name.to_string(),
            position: None,
            aliases: Vec::new(),
            kind,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }
}

/// The arguments a command accepts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandSignature {
    pub args: Vec<ArgSpec>,
}

impl CommandSignature {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }
}

/// A cleaned argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Float(v) => write!(f, "{}", v),
            ArgValue::Bool(v) => write!(f, "{}", v),
            ArgValue::Text(v) => f.write_str(v),
        }
    }
}

/// Sanitized arguments, split the way the signature declares them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SanitizedArgs {
    /// Positional arguments in position order
    pub positional: Vec<(String, ArgValue)>,
    /// Keyword-only arguments, sorted by name
    pub keyword: BTreeMap<String, ArgValue>,
}

impl SanitizedArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.positional
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.keyword.get(name))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            ArgValue::Float(v) => Some(*v),
            ArgValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ArgValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// A supplied value that was changed, or ignored, during sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub name: String,
    pub supplied: String,
    /// What was used instead; `None` when the argument was dropped
    pub used: Option<String>,
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.used {
            Some(used) => write!(
                f,
                "`{}` value `{}` was replaced with `{}`",
                self.name, self.supplied, used
            ),
            None => write!(f, "`{}` (`{}`) is not accepted and was ignored", self.name, self.supplied),
        }
    }
}

/// Sanitize raw positional and keyword arguments against `signature`.
pub fn sanitize(
    signature: &CommandSignature,
    positional: &[String],
    keyword: &BTreeMap<String, String>,
) -> Result<(SanitizedArgs, Vec<Adjustment>), SanitizationError> {
    let mut out = SanitizedArgs::default();
    let mut adjustments = Vec::new();

    let mut specs: Vec<&ArgSpec> = signature.args.iter().collect();
    specs.sort_by_key(|spec| spec.position.unwrap_or(usize::MAX));

    for spec in specs {
        let raw = std::iter::once(&spec.name)
            .chain(spec.aliases.iter())
            .find_map(|name| keyword.get(name))
            .or_else(|| spec.position.and_then(|p| positional.get(p)))
            .map(String::as_str);

        let (value, adjusted) = sanitize_value(&spec.name, &spec.kind, raw)?;
        if adjusted {
            adjustments.push(Adjustment {
                name: spec.name.clone(),
                supplied: raw.unwrap_or_default().to_string(),
                used: value.as_ref().map(ArgValue::to_string),
            });
        }

        let Some(value) = value else { continue };
        if spec.position.is_some() {
            out.positional.push((spec.name.clone(), value));
        } else {
            out.keyword.insert(spec.name.clone(), value);
        }
    }

    let positional_slots = signature
        .args
        .iter()
        .filter_map(|spec| spec.position)
        .max()
        .map_or(0, |p| p + 1);
    for (i, extra) in positional.iter().enumerate().skip(positional_slots) {
        adjustments.push(Adjustment {
            name: format!("argument {}", i + 1),
            supplied: extra.clone(),
            used: None,
        });
    }
    for (name, value) in keyword {
        let known = signature
            .args
            .iter()
            .any(|spec| &spec.name == name || spec.aliases.contains(name));
        if !known {
            adjustments.push(Adjustment {
                name: name.clone(),
                supplied: value.clone(),
                used: None,
            });
        }
    }

    Ok((out, adjustments))
}

/// Returns the value (if any) and whether a supplied value was not taken as is.
fn sanitize_value(
    name: &str,
    kind: &ArgKind,
    raw: Option<&str>,
) -> Result<(Option<ArgValue>, bool), SanitizationError> {
    let supplied = raw.map(str::trim).filter(|s| !s.is_empty());

    let (value, exact) = match kind {
        ArgKind::Int { min, max, default } => {
            let value = sanitize_int(supplied, *min, *max, *default);
            let exact = supplied.and_then(|s| s.parse::<i64>().ok()) == Some(value);
            (Some(ArgValue::Int(value)), exact)
        }
        ArgKind::Float { min, max, default } => {
            let value = sanitize_number(supplied, Some(*min), Some(*max), *default);
            let exact = supplied.and_then(|s| s.parse::<f64>().ok()) == Some(value);
            (Some(ArgValue::Float(value)), exact)
        }
        ArgKind::Bool { default } => {
            let value = sanitize_bool(supplied, *default);
            let exact = supplied.and_then(datamd_config::parse_bool).is_some();
            (Some(ArgValue::Bool(value)), exact)
        }
        ArgKind::Text {
            max_len,
            filter,
            default,
        } => {
            let value = sanitize_string(supplied, *max_len, filter);
            let exact = supplied == Some(value.as_str());
            if value.is_empty() {
                (default.clone().map(ArgValue::Text), exact)
            } else {
                (Some(ArgValue::Text(value)), exact)
            }
        }
        ArgKind::Identifier { max_len, required } => {
            let value = sanitize_string(supplied, *max_len, &CharFilter::Identifier);
            if value.is_empty() && *required {
                let reason = match supplied {
                    Some(s) => format!("has no usable characters in `{}`", s),
                    None => "is required".to_string(),
                };
                return Err(SanitizationError::new(name, reason));
            }
            let exact = supplied == Some(value.as_str());
            ((!value.is_empty()).then_some(ArgValue::Text(value)), exact)
        }
        ArgKind::Choice { options, default } => {
            let value = sanitize_choice(supplied, options, default);
            let exact = supplied.is_some_and(|s| s.eq_ignore_ascii_case(&value));
            (Some(ArgValue::Text(value)), exact)
        }
        ArgKind::Delimiter { default } => {
            let value = sanitize_delimiter(supplied, *default);
            let exact = supplied.and_then(parse_delimiter).is_some();
            (Some(ArgValue::Text(value.to_string())), exact)
        }
        ArgKind::SheetRef => {
            let value = sanitize_sheet_ref(supplied);
            let exact = supplied.is_some_and(|s| s == value.to_string());
            (Some(value), exact)
        }
        ArgKind::Pages { max } => {
            let value = sanitize_pages(supplied, *max);
            let exact = supplied.is_some_and(|s| s.eq_ignore_ascii_case(&value.to_string()));
            (Some(value), exact)
        }
    };
    Ok((value, supplied.is_some() && !exact))
}

/// Parse a number and clamp it to the optional bounds; unparsable input gives `default`.
pub fn sanitize_number(raw: Option<&str>, min: Option<f64>, max: Option<f64>, default: f64) -> f64 {
    let Some(value) = raw
        .map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
    else {
        return default;
    };
    let value = min.map_or(value, |min| value.max(min));
    max.map_or(value, |max| value.min(max))
}

/// Integer flavour of [`sanitize_number`]; fractional input is truncated.
pub fn sanitize_int(raw: Option<&str>, min: i64, max: i64, default: i64) -> i64 {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };
    let parsed = s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    });
    match parsed {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

pub fn sanitize_bool(raw: Option<&str>, default: bool) -> bool {
    raw.map(str::trim)
        .and_then(datamd_config::parse_bool)
        .unwrap_or(default)
}

/// Truncate to `max_len` characters after dropping characters `filter` rejects.
pub fn sanitize_string(raw: Option<&str>, max_len: usize, filter: &CharFilter) -> String {
    raw.unwrap_or_default()
        .chars()
        .filter(|c| filter.keeps(*c))
        .take(max_len)
        .collect()
}

/// Case-insensitive match against `options`; anything else gives `default`.
pub fn sanitize_choice(raw: Option<&str>, options: &[String], default: &str) -> String {
    raw.map(str::trim)
        .and_then(|s| options.iter().find(|o| o.eq_ignore_ascii_case(s)))
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

pub fn sanitize_delimiter(raw: Option<&str>, default: char) -> char {
    raw.and_then(parse_delimiter).unwrap_or(default)
}

/// A single ASCII punctuation or whitespace character, or `tab`.
fn parse_delimiter(raw: &str) -> Option<char> {
    if raw.eq_ignore_ascii_case("tab") || raw == "\\t" {
        return Some('\t');
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && !c.is_ascii_alphanumeric() && c != '"' => Some(c),
        _ => None,
    }
}

/// Worksheet names may not contain `[]:*?/\`.
pub fn sanitize_sheet_ref(raw: Option<&str>) -> ArgValue {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ArgValue::Int(0);
    };
    if let Ok(index) = s.parse::<i64>() {
        return ArgValue::Int(index.max(0));
    }
    let name: String = s
        .chars()
        .filter(|c| !c.is_control() && !"[]:*?/\\".contains(*c))
        .take(31)
        .collect();
    if name.is_empty() {
        ArgValue::Int(0)
    } else {
        ArgValue::Text(name)
    }
}

pub fn sanitize_pages(raw: Option<&str>, max: i64) -> ArgValue {
    match raw.map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("all") => ArgValue::Text("all".to_string()),
        Some(s) => match s.parse::<i64>() {
            Ok(n) => ArgValue::Int(n.clamp(1, max.max(1))),
            Err(_) => ArgValue::Text("all".to_string()),
        },
        None => ArgValue::Text("all".to_string()),
    }
}
