//! Text-level payload recovery

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::ShapeError;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)```").expect("fence pattern is valid"));

/// Interior of the first fenced block, or the input unchanged
pub fn strip_fences(raw: &str) -> &str {
    match FENCE_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => {
            debug!(inner_len = inner.as_str().len(), "strip_fences: fenced block found");
            inner.as_str().trim()
        }
        None => raw,
    }
}

/// Slice from the first `{` to the last `}` inclusive, when both exist in order
pub fn slice_object(candidate: &str) -> &str {
    match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => candidate,
    }
}

/// Best-effort JSON text: fences removed, surrounding commentary dropped
pub fn extract_payload(raw: &str) -> &str {
    slice_object(strip_fences(raw))
}

/// Texts worth parsing, best first
///
/// The fenced interior comes first. When the raw text holds a fence inside a
/// JSON string value, that interior is a fragment, so the object sliced from
/// the unfenced text follows as a second candidate.
pub fn payload_candidates(raw: &str) -> impl Iterator<Item = &str> {
    let primary = extract_payload(raw);
    let unfenced = slice_object(raw);
    std::iter::once(primary).chain((unfenced != primary).then_some(unfenced))
}

/// Parse and validate the first candidate that passes; the first error otherwise
pub fn parse_with<T>(raw: &str, validate: impl Fn(Value) -> Result<T, ShapeError>) -> Result<T, ShapeError> {
    let mut first_error = None;
    for candidate in payload_candidates(raw) {
        match serde_json::from_str::<Value>(candidate)
            .map_err(ShapeError::from)
            .and_then(&validate)
        {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(error = %e, candidate_len = candidate.len(), "parse_with: candidate rejected");
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or(ShapeError::NotObject))
}

/// The array under `key` in a JSON object
pub fn required_array<'a>(value: &'a Value, key: &str) -> Result<&'a Vec<Value>, ShapeError> {
    let object = value.as_object().ok_or(ShapeError::NotObject)?;
    match object.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ShapeError::wrong_type(key, "an array")),
        None => Err(ShapeError::MissingKey(key.to_string())),
    }
}

/// Parse raw generator text into an object whose `required_key` is an array
pub fn parse_structured(raw: &str, required_key: &str) -> Result<Value, ShapeError> {
    debug!(raw_len = raw.len(), %required_key, "parse_structured: called");
    parse_with(raw, |value| {
        required_array(&value, required_key)?;
        Ok(value)
    })
}
