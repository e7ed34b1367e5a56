/// Value Normalizer - Lenient Coercion of Test Data
///
/// Problem banks encode answers inconsistently: `5`, `"5"`, `"[1, 2]"` and
/// `[1, 2]` all show up. Every value is brought to one canonical tree before
/// it reaches the sandbox or the comparator.
///
/// **Rules:**
/// - Null, booleans and numbers pass through
/// - Arrays and objects are normalized element-wise / value-wise
/// - A string whose trimmed form parses as JSON is replaced by the
///   normalized parse result (recursively, so doubly-encoded values unwrap)
/// - Any other string, including a blank one, is kept verbatim (untrimmed)
///
/// Normalization never fails.

use serde_json::Value;

pub fn normalize(raw: &Value) -> Value {
    match raw {
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), normalize(value)))
                .collect(),
        ),
        Value::String(s) => normalize_string(s),
        scalar => scalar.clone(),
    }
}

fn normalize_string(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::String(s.to_string());
    }

    // each successful parse strictly shortens the text, so this terminates
    match serde_json::from_str::<Value>(trimmed) {
        Ok(parsed) => normalize(&parsed),
        Err(_) => Value::String(s.to_string()),
    }
}

/// Normalize a raw argument value into a positional argument list.
///
/// The array check is made on the raw value: `[1, 2]` is two arguments,
/// while the string `"[1, 2]"` is a single array-valued argument.
pub fn normalize_arguments(raw: &Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items.iter().map(normalize).collect(),
        other => vec![normalize(other)],
    }
}
