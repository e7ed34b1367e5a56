/// Comparator - Structural Equality of Results
///
/// **Core Responsibility:**
/// Decide whether a submission's returned value matches a case's expectation
/// and render both sides for failure reports.
///
/// **Comparison Rules:**
/// - Mapping key order: IGNORED (keys sorted recursively before comparing)
/// - Sequence order: SIGNIFICANT (`[1, 2]` differs from `[2, 1]`)
/// - Numbers: compared by value, so `1` equals `1.0`
/// - Types: STRICT (`1` differs from `"1"`)
///
/// Expectations were normalized by the adapter, so a stringified `"1"` in a
/// problem bank has already become the number 1 by the time it gets here.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Integral floats become integers when they fit in i64 or u64, so `1.0`
/// and `1e19` compare equal to the integers a JS runtime prints for them.
fn canonical_number(n: &Number) -> Number {
    if !n.is_f64() {
        return n.clone();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => {
            if f >= i64::MIN as f64 && f < i64::MAX as f64 {
                Number::from(f as i64)
            } else if f > 0.0 && f < u64::MAX as f64 {
                Number::from(f as u64)
            } else {
                n.clone()
            }
        }
        _ => n.clone(),
    }
}

/// Rebuild `value` with every mapping's keys in sorted order and integral
/// floats folded into integers.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(key, v)| (key, canonicalize(v))).collect();
            let mut canonical = Map::new();
            for (key, v) in sorted {
                canonical.insert(key.clone(), v);
            }
            Value::Object(canonical)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(canonical_number(n)),
        other => other.clone(),
    }
}

pub fn equal(actual: &Value, expected: &Value) -> bool {
    canonicalize(actual) == canonicalize(expected)
}

/// Render a value for display: strings verbatim, anything else as compact JSON.
pub fn serialize_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
