/// Test Case Adapter - Uniform Cases from Loose Records
///
/// Raw cases come from hand-written problem banks and PDF extraction, so the
/// same field shows up under several names. Each semantic field is resolved
/// through an ordered alias list; the first key present wins. A `null` input
/// counts as absent, a `null` expectation is kept.
///
/// A record without any input alias is itself the argument bag, minus the
/// output aliases. A record without any output alias has no expectation: the
/// case passes as long as the submission does not fault.

use crate::normalizer::{normalize, normalize_arguments};
use sentinel_common::types::NormalizedTestCase;
use serde_json::{Map, Value};

pub const SAMPLE_LABEL: &str = "Sample Case";
pub const HIDDEN_LABEL: &str = "Hidden Case";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseField {
    Label,
    Input,
    Expected,
}

/// Alias table: semantic field → candidate keys in precedence order.
pub const CASE_ALIASES: &[(CaseField, &[&str])] = &[
    (CaseField::Label, &["name", "label"]),
    (CaseField::Input, &["input", "inputs", "case", "given"]),
    (CaseField::Expected, &["output", "expected", "answer"]),
];

pub fn aliases(field: CaseField) -> &'static [&'static str] {
    CASE_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

/// First present alias of `field` in `record`.
fn lookup<'a>(record: &'a Map<String, Value>, field: CaseField) -> Option<&'a Value> {
    aliases(field).iter().find_map(|key| record.get(*key))
}

fn strip_expected(record: &Map<String, Value>) -> Value {
    let output_keys = aliases(CaseField::Expected);
    Value::Object(
        record
            .iter()
            .filter(|(key, _)| !output_keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

fn adapt_single(raw: &Value, fallback_label: String) -> NormalizedTestCase {
    let Value::Object(record) = raw else {
        // a bare scalar or array carries no field names: it is the input
        return NormalizedTestCase {
            label: fallback_label,
            input: normalize_arguments(raw),
            expected: None,
        };
    };

    let label = match lookup(record, CaseField::Label) {
        Some(Value::String(name)) => name.clone(),
        _ => fallback_label,
    };

    // a null input falls back to the argument bag; a null expectation is kept
    let input = match lookup(record, CaseField::Input) {
        Some(value) if !value.is_null() => normalize_arguments(value),
        _ => normalize_arguments(&strip_expected(record)),
    };

    let expected = lookup(record, CaseField::Expected).map(normalize);

    NormalizedTestCase {
        label,
        input,
        expected,
    }
}

/// Adapt a raw case, or a list of raw cases, into normalized cases.
///
/// Labels default to `label_prefix`, suffixed with the 1-based position only
/// when the raw list holds more than one element. Null elements are skipped.
pub fn adapt(raw: &Value, label_prefix: &str) -> Vec<NormalizedTestCase> {
    let list: &[Value] = match raw {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    };

    list.iter()
        .enumerate()
        .filter(|(_, item)| !item.is_null())
        .map(|(index, item)| {
            let fallback = if list.len() > 1 {
                format!("{} {}", label_prefix, index + 1)
            } else {
                label_prefix.to_string()
            };
            adapt_single(item, fallback)
        })
        .collect()
}
