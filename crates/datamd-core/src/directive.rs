/*
 * directive.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Scanning and parsing of `{{ command "path" args... }}` directives.
 */

//! Directive scanner.
//!
//! A directive is written as
//!
//! ```text
//! {{ command "subject/path.csv" positional key=value key="quoted value" }}
//! ```
//!
//! The command is `[A-Za-z_][A-Za-z0-9_]*`. Only registered commands are
//! directives: for anything else the `{{` is plain text and scanning resumes
//! right after it, so unknown constructs pass through byte for byte.
//!
//! A directive of a registered command that does not follow the grammar is
//! reported as [`LinePart::Malformed`] and kept verbatim in the output.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::DirectiveError;

/// A parsed directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveInvocation {
    pub command: String,
    pub raw_path: String,
    pub positional_args: Vec<String>,
    pub keyword_args: BTreeMap<String, String>,
}

impl DirectiveInvocation {
    /// Serialize back to directive syntax. Parsing the result yields an equal invocation.
    pub fn to_directive_string(&self) -> String {
        let mut parts = vec![self.command.clone(), quote(&self.raw_path)];
        parts.extend(self.positional_args.iter().map(|arg| quote_if_needed(arg)));
        parts.extend(
            self.keyword_args
                .iter()
                .map(|(key, value)| format!("{}={}", key, quote_if_needed(value))),
        );
        format!("{{{{ {} }}}}", parts.join(" "))
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '{' | '}' | '='));
    if needs_quotes {
        quote(value)
    } else {
        value.to_string()
    }
}

/// A piece of a scanned line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePart<'a> {
    /// Text copied to the output unchanged
    Text(&'a str),
    Directive {
        /// Byte range of the whole directive within the line
        span: Range<usize>,
        invocation: DirectiveInvocation,
    },
    /// A broken directive of a registered command; output unchanged
    Malformed {
        span: Range<usize>,
        error: DirectiveError,
    },
}

/// Split `line` into text, directives and malformed directives.
///
/// Concatenating the source text of every part reproduces `line`.
pub fn scan_line<'a>(line: &'a str, is_registered: impl Fn(&str) -> bool) -> Vec<LinePart<'a>> {
    let mut parts = Vec::new();
    let mut text_start = 0;
    let mut search_from = 0;

    while let Some(found) = line[search_from..].find("{{") {
        let open = search_from + found;
        let mut cursor = Cursor::new(line, open + 2);
        cursor.skip_whitespace();
        let command = cursor.identifier();

        let Some(command) = command.filter(|c| is_registered(c)) else {
            search_from = open + 1;
            continue;
        };
        let command = command.to_string();

        if text_start < open {
            parts.push(LinePart::Text(&line[text_start..open]));
        }

        match parse_body(&mut cursor, command) {
            Ok(invocation) => {
                parts.push(LinePart::Directive {
                    span: open..cursor.pos,
                    invocation,
                });
            }
            Err(error) => {
                let end = line[cursor.pos..]
                    .find("}}")
                    .map_or(line.len(), |i| cursor.pos + i + 2);
                parts.push(LinePart::Malformed {
                    span: open..end,
                    error,
                });
                cursor.pos = end;
            }
        }
        text_start = cursor.pos;
        search_from = cursor.pos;
    }

    if text_start < line.len() {
        parts.push(LinePart::Text(&line[text_start..]));
    }
    parts
}

/// Parse a single directive such as `{{ csv "data.csv" }}`.
///
/// The whole input must be one directive; surrounding whitespace is allowed.
pub fn parse_directive(text: &str) -> Result<DirectiveInvocation, DirectiveError> {
    let trimmed = text.trim();
    let mut cursor = Cursor::new(trimmed, 0);
    if !cursor.eat("{{") {
        return Err(DirectiveError::Unclosed);
    }
    cursor.skip_whitespace();
    let command = cursor
        .identifier()
        .ok_or(DirectiveError::MissingSubjectPath {
            command: String::new(),
        })?
        .to_string();
    let invocation = parse_body(&mut cursor, command)?;
    if cursor.pos != trimmed.len() {
        return Err(DirectiveError::Unclosed);
    }
    Ok(invocation)
}

/// Parse everything after the command name, up to and including `}}`.
fn parse_body(cursor: &mut Cursor<'_>, command: String) -> Result<DirectiveInvocation, DirectiveError> {
    cursor.skip_whitespace();
    if cursor.peek() != Some('"') {
        return Err(DirectiveError::MissingSubjectPath { command });
    }
    let raw_path = cursor.quoted()?;

    let mut positional_args = Vec::new();
    let mut keyword_args = BTreeMap::new();

    loop {
        cursor.skip_whitespace();
        if cursor.eat("}}") {
            break;
        }
        match cursor.peek() {
            None => return Err(DirectiveError::Unclosed),
            Some('"') => positional_args.push(cursor.quoted()?),
            Some('=') => return Err(DirectiveError::EmptyKey),
            Some(_) => {
                let word = cursor.bare()?;
                if cursor.peek() == Some('=') {
                    cursor.bump();
                    if !is_valid_key(word) {
                        return Err(DirectiveError::InvalidKey(word.to_string()));
                    }
                    let value = match cursor.peek() {
                        Some('"') => cursor.quoted()?,
                        _ => cursor.bare()?.to_string(),
                    };
                    if value.is_empty() && !cursor.last_was_quoted {
                        return Err(DirectiveError::EmptyValue(word.to_string()));
                    }
                    keyword_args.insert(word.to_string(), value);
                } else {
                    positional_args.push(word.to_string());
                }
            }
        }
    }

    Ok(DirectiveInvocation {
        command,
        raw_path,
        positional_args,
        keyword_args,
    })
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    last_was_quoted: bool,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self {
            src,
            pos,
            last_was_quoted: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`
    fn identifier(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                self.bump();
            }
            _ => return None,
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        Some(&self.src[start..self.pos])
    }

    /// A double-quoted string with `\"` and `\\` escapes; the cursor is on the opening quote.
    fn quoted(&mut self) -> Result<String, DirectiveError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(DirectiveError::UnterminatedQuote),
                Some('"') => break,
                Some('\\') => match self.peek() {
                    Some(c @ ('"' | '\\')) => {
                        self.bump();
                        value.push(c);
                    }
                    _ => value.push('\\'),
                },
                Some(c) => value.push(c),
            }
        }
        self.last_was_quoted = true;
        Ok(value)
    }

    /// A bare token, ending at whitespace, `=`, or `}}`.
    fn bare(&mut self) -> Result<&'a str, DirectiveError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                c if c.is_whitespace() => break,
                '=' => break,
                '}' if self.rest().starts_with("}}") => break,
                '{' | '}' | '"' => return Err(DirectiveError::StrayCharacter { found: c }),
                _ => {
                    self.bump();
                }
            }
        }
        self.last_was_quoted = false;
        Ok(&self.src[start..self.pos])
    }
}
