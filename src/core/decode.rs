//! Lenient decoding of chat-completion payloads into extraction records.
//!
//! Models asked for "JSON only" still wrap the object in prose, markdown
//! fences, or both. Decoding therefore runs a ladder: parse the raw text,
//! then strip code fences, then slice from the first `{` to the last `}`.
//! Key lookup tolerates aliases and case differences, and obviously empty
//! values ("null", "n/a") count as missing so the sentinel fill applies.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::record::{ExtractField, ExtractedRecord};

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Matches ```json ... ``` and bare ``` ... ``` blocks.
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap_or_else(|e| {
        unreachable!("fence regex is a tested literal: {e}")
    })
});

/// Decode a raw response body into a total record, or `None` when no JSON
/// object can be recovered.
///
/// `overrides` are applied last and always win; the original title in
/// particular is never read from the payload.
#[must_use]
pub fn decode_record(
    content: &str,
    overrides: &BTreeMap<ExtractField, String>,
) -> Option<ExtractedRecord> {
    let object = extract_json_object(content)?;
    let mut decoded = BTreeMap::new();
    for field in ExtractField::ALL {
        if field == ExtractField::OriginalTitle {
            continue;
        }
        if let Some(value) = resolve_field(&object, field) {
            decoded.insert(field, value);
        }
    }
    Some(ExtractedRecord::from_parts(decoded, overrides))
}

/// Recover a JSON object from possibly decorated text.
fn extract_json_object(content: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Rung 1: the whole body is the object.
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    // Rung 2: object inside a markdown fence.
    if let Some(captures) = FENCE_RE.captures(trimmed) {
        if let Some(inner) = captures.get(1) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(inner.as_str()) {
                debug!("recovered JSON object from fenced block");
                return Some(map);
            }
        }
    }

    // Rung 3: widest brace-delimited slice.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => {
            debug!("recovered JSON object from brace slice");
            Some(map)
        }
        _ => None,
    }
}

/// Look a field up in the object, probing aliases in order, case-insensitive.
fn resolve_field(
    object: &serde_json::Map<String, Value>,
    field: ExtractField,
) -> Option<String> {
    for alias in field.aliases() {
        for (key, value) in object {
            if key.eq_ignore_ascii_case(alias) {
                if let Some(text) = usable_text(value) {
                    return Some(text);
                }
            }
        }
    }
    None
}

/// Accept non-empty strings and numbers; anything else counts as missing.
fn usable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            let lowered = trimmed.to_ascii_lowercase();
            if matches!(lowered.as_str(), "null" | "none" | "n/a" | "na") {
                return None;
            }
            Some(trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
