//! Tolerant decoding of model replies.
//!
//! The provider is unreliable: it may wrap JSON in a markdown fence,
//! answer in `**key**: value` prose lines, or omit fields entirely. The
//! decoder applies ordered strategies:
//!
//! 1. strip an enclosing code fence (with or without a language tag);
//! 2. strict JSON object decode;
//! 3. line-oriented `**key**: value` fallback parse;
//! 4. integer coercion for integer-typed schema fields;
//! 5. defaulting of missing required fields — unless *nothing* was
//!    recovered, in which case the raw content comes back as a
//!    [`GatewayError::SchemaMismatch`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::GatewayError;
use crate::gateway::schema::{FieldKind, ResponseSchema};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A structured model reply keyed by schema field name.
pub type StructuredReply = BTreeMap<String, FieldValue>;

static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*:\s*(.*)").expect("valid line pattern"));

/// Decode raw model output against a schema.
pub fn decode(content: &str, schema: &ResponseSchema) -> Result<StructuredReply, GatewayError> {
    let stripped = strip_code_fence(content);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stripped) {
        if let Some(object) = value.as_object() {
            let mut reply = StructuredReply::new();
            for field in schema.fields() {
                let decoded = object.get(field.name).map(|v| coerce_json(v, &field.kind));
                reply.insert(
                    field.name.to_string(),
                    decoded.unwrap_or_else(|| default_value(field.name, &field.kind)),
                );
            }
            return Ok(reply);
        }
    }

    decode_lines(stripped, schema)
}

/// Permissive line-oriented fallback: `**key**: value` per line.
fn decode_lines(content: &str, schema: &ResponseSchema) -> Result<StructuredReply, GatewayError> {
    let mut recovered: BTreeMap<&str, String> = BTreeMap::new();
    for line in content.lines() {
        if let Some(caps) = LINE_PATTERN.captures(line.trim()) {
            let key = caps[1].trim();
            let value = caps[2].trim();
            if let Some(field) = schema.field(key) {
                recovered.insert(field.name, value.to_string());
            }
        }
    }

    // A reply that yields nothing at all is not worth defaulting into
    // shape — surface it with the raw content for the audit trail.
    if recovered.is_empty() {
        return Err(GatewayError::SchemaMismatch {
            missing: schema.required().map(String::from).collect(),
            raw: content.to_string(),
        });
    }

    let mut reply = StructuredReply::new();
    for field in schema.fields() {
        let value = match recovered.get(field.name) {
            Some(raw) => coerce_text(raw, &field.kind),
            None => default_value(field.name, &field.kind),
        };
        reply.insert(field.name.to_string(), value);
    }
    Ok(reply)
}

/// Strip an enclosing markdown code fence, language tag included.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match body.split_once('\n') {
        Some((first, tail)) if is_language_tag(first) => tail.trim(),
        _ => body.trim(),
    }
}

/// A short bare word like `json`, with or without surrounding spaces.
fn is_language_tag(line: &str) -> bool {
    let tag = line.trim();
    !tag.is_empty() && tag.len() <= 16 && tag.chars().all(|c| c.is_ascii_alphanumeric())
}

fn coerce_json(value: &serde_json::Value, kind: &FieldKind) -> FieldValue {
    match value {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Int(i),
            None => FieldValue::Text(n.to_string()),
        },
        serde_json::Value::String(s) => coerce_text(s, kind),
        other => FieldValue::Text(other.to_string()),
    }
}

/// Coerce a textual value: integer-typed fields parse to `Int` when
/// possible and stay text otherwise.
fn coerce_text(raw: &str, kind: &FieldKind) -> FieldValue {
    if let FieldKind::Integer { .. } = kind {
        if let Ok(n) = raw.trim().parse::<i64>() {
            return FieldValue::Int(n);
        }
    }
    FieldValue::Text(raw.to_string())
}

/// Deterministic default for a missing required field.
fn default_value(name: &str, kind: &FieldKind) -> FieldValue {
    match kind {
        FieldKind::Integer { .. } => FieldValue::Int(0),
        FieldKind::Text | FieldKind::Enum(_) => {
            FieldValue::Text(format!("missing '{name}' in model reply"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_schema() -> ResponseSchema {
        ResponseSchema::new().score("score").text("explanation")
    }

    #[test]
    fn decodes_strict_json() {
        let reply = decode(r#"{"score": 7, "explanation": "vivid"}"#, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(7));
        assert_eq!(reply["explanation"], FieldValue::Text("vivid".into()));
    }

    #[test]
    fn strips_fence_with_language_tag() {
        let raw = "```json\n{\"score\": 3, \"explanation\": \"ok\"}\n```";
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(3));
    }

    #[test]
    fn strips_fence_with_spaced_language_tag() {
        let raw = "``` json\n{\"score\": 5, \"explanation\": \"ok\"}\n```";
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(5));
        assert_eq!(reply["explanation"], FieldValue::Text("ok".into()));
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n{\"score\": 4, \"explanation\": \"ok\"}\n```";
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(4));
    }

    #[test]
    fn json_string_score_is_coerced_to_int() {
        let reply = decode(r#"{"score": "9", "explanation": "x"}"#, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(9));
    }

    #[test]
    fn fallback_line_format_is_parsed() {
        let raw = "**score**: 8\n**explanation**: strong emotional pull";
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(8));
        assert_eq!(
            reply["explanation"],
            FieldValue::Text("strong emotional pull".into())
        );
    }

    #[test]
    fn fallback_non_numeric_integer_stays_text() {
        let raw = "**score**: very high\n**explanation**: x";
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Text("very high".into()));
    }

    #[test]
    fn missing_field_gets_deterministic_default() {
        let raw = "**explanation**: only the explanation came back";
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply["score"], FieldValue::Int(0));
    }

    #[test]
    fn json_missing_text_field_gets_explanatory_default() {
        let reply = decode(r#"{"score": 5}"#, &score_schema()).unwrap();
        assert_eq!(
            reply["explanation"],
            FieldValue::Text("missing 'explanation' in model reply".into())
        );
    }

    #[test]
    fn unrecoverable_reply_is_schema_mismatch() {
        let err = decode("the model rambled with no structure", &score_schema()).unwrap_err();
        match err {
            GatewayError::SchemaMismatch { missing, raw } => {
                assert_eq!(missing, vec!["score".to_string(), "explanation".to_string()]);
                assert!(raw.contains("rambled"));
            }
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn json_and_line_formats_decode_identically() {
        // Parser-equivalence: same data, both wire shapes.
        let schema = ResponseSchema::new()
            .enumeration("decision", &["Yes", "No"])
            .score("score")
            .text("explanation");
        let json = r#"{"decision": "Yes", "score": 6, "explanation": "solid"}"#;
        let lines = "**decision**: Yes\n**score**: 6\n**explanation**: solid";
        assert_eq!(decode(json, &schema).unwrap(), decode(lines, &schema).unwrap());
    }

    #[test]
    fn extra_keys_outside_schema_are_ignored() {
        let raw = r#"{"score": 2, "explanation": "x", "confidence": 0.4}"#;
        let reply = decode(raw, &score_schema()).unwrap();
        assert_eq!(reply.len(), 2);
    }
}
