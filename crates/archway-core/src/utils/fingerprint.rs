//! Canonical request fingerprinting.
//!
//! Cache keys and in-flight coalescing both depend on two different requests
//! for the same data producing byte-identical keys, regardless of JSON object
//! key order or insignificant whitespace in the original payload.
//!
//! Key shapes:
//! - no params (or `params: []`): `method`
//! - single scalar param: `method:scalar`
//! - anything else: `method:<canonical JSON of params>`
//!
//! The full cache key is prefixed with the network: `network:fingerprint`.

use crate::types::RpcParams;
use serde_json::Value;
use std::fmt::Write;

/// Computes the `(method, params)` fingerprint.
///
/// Total over all parameter shapes; absent params and an empty positional
/// array are equivalent.
#[must_use]
pub fn method_fingerprint(method: &str, params: Option<&RpcParams>) -> String {
    let Some(params) = params.filter(|p| !matches!(p, RpcParams::ByPosition(v) if v.is_empty()))
    else {
        return method.to_string();
    };

    if let RpcParams::ByPosition(values) = params {
        if values.len() == 1 {
            if let Some(scalar) = scalar_as_string(&values[0]) {
                return format!("{method}:{scalar}");
            }
        }
    }

    format!("{method}:{}", canonical_json(&params.to_value()))
}

/// Computes the full cache key: `network:fingerprint`.
#[must_use]
pub fn cache_key(network: &str, method: &str, params: Option<&RpcParams>) -> String {
    format!("{network}:{}", method_fingerprint(method, params))
}

fn scalar_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Serializes a JSON value deterministically: object keys sorted, no
/// insignificant whitespace. Idempotent — re-parsing and re-serializing the
/// output yields the same string.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::with_capacity(64);
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            // serde_json handles escaping; a String value cannot fail to serialize
            if let Ok(escaped) = serde_json::to_string(s) {
                out.push_str(&escaped);
            }
        }
        Value::Array(values) => {
            out.push('[');
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if let Ok(escaped) = serde_json::to_string(key) {
                    out.push_str(&escaped);
                }
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}
