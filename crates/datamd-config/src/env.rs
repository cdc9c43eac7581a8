/*
 * env.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Environment variable naming and typed parsing.
 */

use serde_json::Value;

use crate::ConfigError;

/// Prefix shared by every configuration environment variable.
pub const ENV_PREFIX: &str = "DATAMD";

/// `performance` + `chunk_size` -> `DATAMD_PERFORMANCE_CHUNK_SIZE`.
pub fn env_var_name(section: &str, key: &str) -> String {
    format!(
        "{}_{}_{}",
        ENV_PREFIX,
        section.to_ascii_uppercase(),
        key.to_ascii_uppercase()
    )
}

/// Parse a raw environment value using the type of the value it replaces.
///
/// Lists are comma separated; a null leaf accepts any string.
pub fn parse_env_value(var: &str, raw: &str, current: &Value) -> Result<Value, ConfigError> {
    let invalid = |expected: &str| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: raw.to_string(),
        expected: expected.to_string(),
    };
    let trimmed = raw.trim();

    match current {
        Value::Bool(_) => parse_bool(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| invalid("a boolean")),
        Value::Number(n) if n.is_u64() || n.is_i64() => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("an integer")),
        Value::Number(_) => trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::from)
            .ok_or_else(|| invalid("a number")),
        Value::Array(_) => Ok(Value::Array(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        Value::Object(_) => Err(invalid("a single value, not a section")),
        Value::String(_) | Value::Null => Ok(Value::String(raw.to_string())),
    }
}

/// Accepted spellings match the boolean directive arguments.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Some(true),
        "false" | "0" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}
