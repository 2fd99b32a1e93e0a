//! Structural equivalence between serialized values.
//!
//! An actual value is equivalent to an expectation when every member the
//! expectation declares is present on the actual value and equivalent to it.
//! Members only the actual value carries are ignored, which lets a test
//! compare an entity against a request model or an anonymous projection.

use crate::core::Result;
use serde::Serialize;
use serde_json::Value;

/// Whether `actual` satisfies `expected`
pub fn is_equivalent(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => {
            expected.iter().all(|(name, expected)| {
                actual
                    .get(name)
                    .is_some_and(|actual| is_equivalent(actual, expected))
            })
        }
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual
                    .iter()
                    .zip(expected)
                    .all(|(actual, expected)| is_equivalent(actual, expected))
        }
        (Value::Number(actual), Value::Number(expected)) => {
            match (actual.as_i64(), expected.as_i64()) {
                (Some(a), Some(e)) => a == e,
                _ => actual.as_f64() == expected.as_f64(),
            }
        }
        _ => actual == expected,
    }
}

/// Whether the elements of `actual` can be paired one-to-one with `expected`
pub fn is_equivalent_collection(actual: &[Value], expected: &[Value]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }

    let mut used = vec![false; actual.len()];
    expected.iter().all(|expected| {
        let matched = actual
            .iter()
            .enumerate()
            .find(|(i, actual)| !used[*i] && is_equivalent(actual, expected));

        match matched {
            Some((i, _)) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Compact rendering for failure messages
pub fn describe(value: &Value) -> String {
    value.to_string()
}
