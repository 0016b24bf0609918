//! Response body helpers
//!
//! The table API wraps records in a top-level `result` that is an object for
//! single-record endpoints and an array for collections.

use serde_json::Value;

/// Normalize a response body to a list of records
///
/// - `{"result": [..]}` → the array
/// - `{"result": {..}}` → a single-element list
/// - `[..]` → the array (APIs that return bare collections)
/// - anything else → empty
pub fn normalize_result(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("result") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        },
        _ => Vec::new(),
    }
}

/// Look up a dotted field path (`caller_id.value`) in a record
pub fn field<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |current, key| current.get(key))
}

/// Render a JSON value the way records present it: strings unquoted
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare a record field against an expected literal
///
/// Table API fields are strings even when numeric, so an expected `1`
/// matches an observed `"1"`.
pub fn field_matches(record: &Value, path: &str, expected: &Value) -> bool {
    match field(record, path) {
        Some(actual) => actual == expected || display_value(actual) == display_value(expected),
        None => false,
    }
}
