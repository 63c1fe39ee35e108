//! Tolerant parsing of the model's JSON verdict

use serde_json::{Map, Value};

use crate::util::strip_code_fences;

/// Fields read from a well-formed verdict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub high_quality: bool,
    pub compress: bool,
    pub compressed_article: Option<String>,
    pub title: Option<String>,
    pub scenario: Option<String>,
    pub reason: Option<String>,
}

/// Outcome of parsing a model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictParse {
    Parsed(ParsedVerdict),
    Malformed { raw: String, error: String },
}

impl VerdictParse {
    fn malformed(raw: &str, error: impl Into<String>) -> Self {
        Self::Malformed {
            raw: raw.to_string(),
            error: error.into(),
        }
    }
}

/// Parse a model response into a verdict.
///
/// Code fences and any prose around the outermost `{...}` are ignored.
/// `high_quality` is required; booleans may also arrive as `"true"`/`"false"`.
pub fn parse_verdict(raw: &str) -> VerdictParse {
    let body = strip_code_fences(raw);
    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return VerdictParse::malformed(raw, "no JSON object in response");
    };
    if end < start {
        return VerdictParse::malformed(raw, "no JSON object in response");
    }

    let object: Map<String, Value> = match serde_json::from_str(&body[start..=end]) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return VerdictParse::malformed(raw, "response is not a JSON object"),
        Err(e) => return VerdictParse::malformed(raw, e.to_string()),
    };

    let Some(high_quality) = object.get("high_quality").and_then(as_flag) else {
        return VerdictParse::malformed(raw, "missing or invalid high_quality");
    };

    VerdictParse::Parsed(ParsedVerdict {
        high_quality,
        compress: object.get("compress").and_then(as_flag).unwrap_or(false),
        compressed_article: as_text(&object, "compressed_article"),
        title: as_text(&object, "title"),
        scenario: as_text(&object, "scenario").map(|s| s.to_lowercase()),
        reason: as_text(&object, "reason"),
    })
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
