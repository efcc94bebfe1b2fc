//! Flattening of serializable objects into ordered key/value pairs
//!
//! Path, query and form objects all go through serde: the object is turned
//! into a `serde_json::Value` first, so `#[serde(rename = "...")]` acts as the
//! field tag. Flattening rules:
//! - scalars map to one pair
//! - arrays of scalars repeat the key once per element
//! - nested objects (and objects inside arrays) use dotted keys `parent.child`
//! - `null` keeps the key with a `null` value; callers decide what that means

use serde::Serialize;
use serde_json::{Map, Value};

/// Textual representation used for path segments, query values and form fields.
///
/// Returns `None` for `null`.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        composite => Some(composite.to_string()),
    }
}

/// Same as [`to_text`] but renders `null` as an empty string.
pub fn to_text_lossy(value: &Value) -> String {
    to_text(value).unwrap_or_default()
}

/// Flattens an object-like value into pairs.
///
/// Returns `Ok(None)` when the object serializes to `null` (e.g. `None` or `()`),
/// which callers treat as "nothing to apply".
pub fn flatten<T: Serialize + ?Sized>(object: &T) -> Result<Option<Vec<(String, Value)>>, String> {
    let value = serde_json::to_value(object).map_err(|e| e.to_string())?;
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => {
            let mut pairs = Vec::with_capacity(map.len());
            flatten_object(None, map, &mut pairs);
            Ok(Some(pairs))
        }
        other => Err(format!(
            "expected a struct or map, got {}",
            kind_name(&other)
        )),
    }
}

fn flatten_object(prefix: Option<&str>, map: Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let key = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key,
        };
        flatten_value(key, value, out);
    }
}

fn flatten_value(key: String, value: Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => flatten_object(Some(&key), map, out),
        Value::Array(items) => {
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(map) => {
                        flatten_object(Some(&format!("{}.{}", key, i)), map, out)
                    }
                    Value::Array(_) => flatten_value(format!("{}.{}", key, i), item, out),
                    scalar => out.push((key.clone(), scalar)),
                }
            }
        }
        scalar => out.push((key, scalar)),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "an object",
    }
}
