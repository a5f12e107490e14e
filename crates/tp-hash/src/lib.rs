// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// hash_payload
// ---------------------------------------------------------------------------

/// Result of canonicalizing and hashing a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPayload {
    /// Hex-encoded SHA-256 of `canonical`.
    pub hash: String,
    /// The canonical serialization the hash was computed over.
    pub canonical: String,
}

/// Canonicalize a JSON value and return its canonical form plus hash.
///
/// Canonical form rules:
/// - object keys sorted bytewise, no insignificant whitespace
/// - arrays in positional order
/// - strings as JSON string literals
/// - booleans and null as their literals
/// - numbers as the shortest round-trip decimal; a float mathematically
///   equal to an integer renders as that integer, so `1` and `1.0` hash
///   identically
///
/// The function is total over JSON-representable values and stable across
/// runs and hosts.
///
/// # Examples
///
/// ```
/// use serde_json::json;
///
/// let a = tp_hash::hash_payload(&json!({"b": 1, "a": 2}));
/// let b = tp_hash::hash_payload(&json!({"a": 2, "b": 1}));
/// assert_eq!(a.hash, b.hash);
/// assert_eq!(a.canonical, r#"{"a":2,"b":1}"#);
/// ```
pub fn hash_payload(value: &Value) -> HashedPayload {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    HashedPayload {
        hash: hex_sha256(canonical.as_bytes()),
        canonical,
    }
}

/// Hash an unordered set of id strings.
///
/// Ids are deduplicated, sorted, joined with `\n`, and hashed with SHA-256.
/// The output is identical for any permutation of the input.
pub fn hash_inputs<S: AsRef<str>>(ids: &[S]) -> String {
    let unique: BTreeMap<&str, ()> = ids.iter().map(|s| (s.as_ref(), ())).collect();
    let joined = unique.keys().copied().collect::<Vec<_>>().join("\n");
    hex_sha256(joined.as_bytes())
}

/// Hex-encoded SHA-256 over raw bytes. Used for binary blob payloads.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex_sha256(bytes)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Canonical writer
// ---------------------------------------------------------------------------

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort keys bytewise; serde_json's map may preserve insertion order.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
    }
}

/// Largest float magnitude at which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        if f.is_nan() {
            out.push_str("\"NaN\"");
        } else if f.is_infinite() {
            out.push_str(if f > 0.0 { "\"Infinity\"" } else { "\"-Infinity\"" });
        } else if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
            // Collapse integral floats so hash(1) == hash(1.0).
            out.push_str(&(f as i64).to_string());
        } else {
            // serde_json uses ryu: shortest round-trip decimal.
            out.push_str(
                &serde_json::to_string(&Value::Number(n.clone()))
                    .unwrap_or_else(|_| f.to_string()),
            );
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
