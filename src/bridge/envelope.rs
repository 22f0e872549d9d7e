//! Script output unwrapping
//!
//! The application answers with one of several wrapper shapes depending on
//! the scripting path taken. `unwrap_script_output` is the single place that
//! knows them; callers only ever see the payload.

use serde_json::{Map, Value};

use crate::error::{BridgeError, ErrorKind};

/// Keys that may sit beside `data` in a wrapper object
const WRAPPER_KEYS: &[&str] = &["data", "success", "ok", "metadata"];

/// Maximum `data` layers peeled; the platform wraps at most twice
const MAX_WRAPPERS: usize = 2;

/// Parse raw stdout and return the payload.
///
/// Accepted shapes, tried in order:
/// 1. a JSON document that is itself a JSON-encoded string (double encoding)
/// 2. an error report: `{error: true, message}` or `{success: false, error}`
/// 3. `{data: {data: payload}}`, `{data: payload}`, or the bare payload
///
/// With `key`, the named member of the payload is returned instead.
pub fn unwrap_script_output(raw: &str, key: Option<&str>) -> Result<Value, BridgeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::new(
            ErrorKind::ScriptError,
            "Script produced no output",
        ));
    }

    let mut value: Value = serde_json::from_str(trimmed).map_err(|e| {
        BridgeError::new(
            ErrorKind::ScriptError,
            format!("Script output is not JSON: {}", e),
        )
    })?;

    if let Value::String(inner) = &value {
        if let Ok(decoded) = serde_json::from_str::<Value>(inner.trim()) {
            if decoded.is_object() || decoded.is_array() {
                value = decoded;
            }
        }
    }

    for depth in 0..=MAX_WRAPPERS {
        if let Some(message) = reported_error(&value) {
            return Err(BridgeError::new(ErrorKind::ScriptError, message));
        }
        if depth == MAX_WRAPPERS {
            break;
        }
        match peel_data(&value) {
            Some(inner) => value = inner,
            None => break,
        }
    }

    match key {
        None => Ok(value),
        Some(key) => match value {
            Value::Object(mut map) => map.remove(key).ok_or_else(|| {
                BridgeError::new(
                    ErrorKind::ScriptError,
                    format!("Script output has no '{}' member", key),
                )
            }),
            _ => Err(BridgeError::new(
                ErrorKind::ScriptError,
                format!("Expected an object with '{}' but got {}", key, kind_of(&value)),
            )),
        },
    }
}

fn reported_error(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    if map.get("error").and_then(Value::as_bool) == Some(true) {
        return Some(message_of(map, "message"));
    }
    if map.get("success").and_then(Value::as_bool) == Some(false) {
        return Some(match map.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(inner)) => message_of(inner, "message"),
            _ => message_of(map, "message"),
        });
    }
    None
}

fn message_of(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "Script reported an error".to_string())
}

fn peel_data(value: &Value) -> Option<Value> {
    let map = value.as_object()?;
    let data = map.get("data")?;
    if map.keys().all(|k| WRAPPER_KEYS.contains(&k.as_str())) {
        Some(data.clone())
    } else {
        None
    }
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
