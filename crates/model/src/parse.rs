//! The single parse-or-fallback boundary for model output.
//!
//! Workflow nodes call these helpers and receive validated values or a
//! `ModelSchema` error; nothing downstream ever touches a malformed blob.

use serde_json::Value;

use fc_domain::{Error, Result};

use crate::traits::ModelOutput;

/// Interpret an output as a JSON object, tolerating a fenced or prose-
/// wrapped object in text mode.
pub fn json_object(output: &ModelOutput) -> Result<Value> {
    match output {
        ModelOutput::Json(v) if v.is_object() => Ok(v.clone()),
        ModelOutput::Json(v) => Err(Error::ModelSchema(format!(
            "expected object, got {}",
            type_name(v)
        ))),
        ModelOutput::Text(t) => extract_object(t)
            .ok_or_else(|| Error::ModelSchema("no JSON object in text output".into())),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Pull the first top-level `{...}` out of free text and parse it.
fn extract_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + ch.len_utf8()];
                    return serde_json::from_str(candidate).ok().filter(Value::is_object);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn str_field(obj: &Value, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::ModelSchema(format!("missing string field {key:?}")))
}

pub fn opt_str_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

pub fn f64_field(obj: &Value, key: &str) -> Result<f64> {
    obj.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::ModelSchema(format!("missing number field {key:?}")))
}

pub fn bool_field(obj: &Value, key: &str) -> Result<bool> {
    obj.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::ModelSchema(format!("missing bool field {key:?}")))
}

/// A list of strings; missing key or non-array yields an empty list,
/// non-string elements are skipped.
pub fn str_list(obj: &Value, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

pub fn clamp_confidence(raw: f64) -> f64 {
    raw.clamp(0.0, 1.0)
}
