//! Parsing of the model's JSON analysis reply.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// The structured fields requested from the model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalysisFields {
    pub abstract_text: String,
    pub innovation_points: String,
    pub summary: String,
    pub verdict: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not JSON at all; the payload carries the serde message.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// Valid JSON, but one of the required fields is absent.
    #[error("response missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

#[derive(Deserialize)]
struct RawFields {
    #[serde(rename = "abstract")]
    abstract_text: Option<Value>,
    innovation_points: Option<Value>,
    summary: Option<Value>,
    verdict: Option<Value>,
}

/// Remove a surrounding Markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Flatten a JSON value into display text: strings as-is, arrays one item
/// per line, objects as compact JSON.
fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(flatten)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn parse_analysis(content: &str) -> Result<AnalysisFields, ParseError> {
    let body = strip_code_fence(content);
    let raw: RawFields =
        serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let mut missing = Vec::new();
    if raw.abstract_text.is_none() {
        missing.push("abstract");
    }
    if raw.innovation_points.is_none() {
        missing.push("innovation_points");
    }
    if raw.summary.is_none() {
        missing.push("summary");
    }
    if !missing.is_empty() {
        return Err(ParseError::MissingFields(missing));
    }

    Ok(AnalysisFields {
        abstract_text: raw.abstract_text.as_ref().map(flatten).unwrap_or_default(),
        innovation_points: raw.innovation_points.as_ref().map(flatten).unwrap_or_default(),
        summary: raw.summary.as_ref().map(flatten).unwrap_or_default(),
        verdict: raw.verdict.as_ref().map(flatten).unwrap_or_default(),
    })
}
