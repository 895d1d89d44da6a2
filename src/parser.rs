use crate::state::MetricsData;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Top-level groups every collector document must carry.
pub const REQUIRED_GROUPS: [&str; 7] = [
    "cpu",
    "memory",
    "disk",
    "network",
    "gpu",
    "system",
    "top_processes",
];

const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to parse script output: empty output")]
    Empty,
    #[error("Failed to parse script output: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("Failed to parse script output: expected JSON object at root level, got {0}")]
    NotObject(&'static str),
    #[error("Failed to parse script output: missing metric groups: {}", .0.join(", "))]
    MissingGroups(Vec<&'static str>),
    #[error("Failed to parse script output: top_processes must be a list")]
    ProcessesNotList,
}

/// Structural acceptance only: field values are the collector's business.
pub fn parse(raw: &[u8]) -> Result<MetricsData, ParseError> {
    let result = parse_inner(raw);
    if let Err(err) = &result {
        debug!(error = %err, raw = %excerpt(raw), "rejected collector output");
    }
    result
}

fn parse_inner(raw: &[u8]) -> Result<MetricsData, ParseError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let map = match serde_json::from_slice::<Value>(raw)? {
        Value::Object(map) => map,
        other => return Err(ParseError::NotObject(kind_of(&other))),
    };

    let missing: Vec<&'static str> = REQUIRED_GROUPS
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingGroups(missing));
    }

    if !map.get("top_processes").is_some_and(Value::is_array) {
        return Err(ParseError::ProcessesNotList);
    }

    Ok(map)
}

/// First 500 characters of the raw output, for diagnostics.
pub fn excerpt(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .take(EXCERPT_CHARS)
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
