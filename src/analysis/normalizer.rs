//! Coercion of untrusted model replies into a [`Diagnosis`].
//!
//! [`normalize`] is total: every input, including the empty string, maps to
//! a diagnosis that satisfies the record invariants. Replies with no usable
//! JSON become an `invalid_image` diagnosis instead of an error.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::extract;
use crate::prompts::DIAGNOSIS_KEYS;
use crate::storage::{Diagnosis, Severity, HEALTHY, INVALID_IMAGE, UNKNOWN_TYPE};

/// Longest excerpt of an unreadable reply kept in the fallback symptoms.
const EXCERPT_CHARS: usize = 200;

/// Normalize a raw model reply.
pub fn normalize(raw: &str) -> Diagnosis {
    let object = extract::parse_object(raw)
        .filter(is_diagnostic)
        .or_else(|| extract::find_object(raw, is_diagnostic));

    match object {
        Some(map) => from_object(&map),
        None => {
            warn!(
                response_chars = raw.chars().count(),
                "Model reply contained no diagnosis JSON, recording invalid_image"
            );
            unreadable_reply(raw)
        }
    }
}

/// An object counts as a diagnosis when it names an outcome.
fn is_diagnostic(map: &Map<String, Value>) -> bool {
    map.contains_key("disease_detected") || map.contains_key("disease_type")
}

/// Prompt keys absent from the reply object.
fn missing_keys(map: &Map<String, Value>) -> Vec<&'static str> {
    DIAGNOSIS_KEYS
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect()
}

fn from_object(map: &Map<String, Value>) -> Diagnosis {
    let missing = missing_keys(map);
    if !missing.is_empty() {
        debug!(missing = ?missing, "Model reply omitted diagnosis fields");
    }

    let disease_type = map
        .get("disease_type")
        .and_then(as_text)
        .map(|t| t.to_lowercase());

    let disease_detected = match map.get("disease_detected").and_then(as_bool) {
        Some(detected) => detected,
        None => disease_type
            .as_deref()
            .map(|t| t != HEALTHY && t != INVALID_IMAGE)
            .unwrap_or(false),
    };

    let disease_type = disease_type.unwrap_or_else(|| {
        if disease_detected {
            UNKNOWN_TYPE.to_string()
        } else {
            HEALTHY.to_string()
        }
    });

    let mut diagnosis = Diagnosis {
        disease_detected,
        disease_name: map.get("disease_name").and_then(as_text),
        disease_type,
        severity: map
            .get("severity")
            .and_then(as_text)
            .and_then(|s| s.parse::<Severity>().ok()),
        confidence: map.get("confidence").map(as_confidence).unwrap_or(0.0),
        symptoms: as_list(map.get("symptoms")),
        possible_causes: as_list(map.get("possible_causes")),
        treatment: as_list(map.get("treatment")),
    };

    // Both sentinel types override the flag
    if diagnosis.is_invalid_image() || diagnosis.disease_type == HEALTHY {
        diagnosis.disease_detected = false;
    }
    if !diagnosis.disease_detected {
        diagnosis.disease_name = None;
        diagnosis.severity = None;
    }

    debug!(
        disease_detected = diagnosis.disease_detected,
        disease_type = %diagnosis.disease_type,
        confidence = diagnosis.confidence,
        "Normalized model reply"
    );

    diagnosis
}

fn unreadable_reply(raw: &str) -> Diagnosis {
    let mut symptoms =
        vec!["The analysis could not be completed because the image could not be interpreted as a plant leaf.".to_string()];

    let excerpt: String = raw.trim().chars().take(EXCERPT_CHARS).collect();
    if !excerpt.is_empty() {
        symptoms.push(format!("Model response: {}", excerpt));
    }

    Diagnosis::invalid_image(
        symptoms,
        vec![
            "Upload a clear, well-lit photo of a single plant leaf.".to_string(),
            "Make sure the leaf fills most of the frame and is in focus.".to_string(),
        ],
    )
}

/// Trimmed non-empty string, or a number rendered as text.
fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_confidence(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    clamp_confidence(raw.unwrap_or(0.0))
}

/// Clamp to `[0, 100]`; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn as_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(other) => vec![other.to_string()],
    }
}
