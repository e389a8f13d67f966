//! Canonical JSON encoding for content fingerprinting.
//!
//! Documents are decoded into a generic JSON value and re-encoded with:
//! - Object keys sorted by their UTF-8 bytes, at every depth
//! - No insignificant whitespace
//! - Strings escaped by the standard JSON encoder
//! - Numbers compared by value: integers verbatim, floats with an exact
//!   integral value (including `-0`) written as integers, other floats in
//!   shortest round-trip form
//!
//! Key order is applied by the encoder rather than inherited from the map
//! type, so the output does not depend on whether `serde_json` was built
//! with `preserve_order`.
//!
//! **Changing this encoding changes every fingerprint in an existing store.**

use crate::error::{Error, Result};
use serde_json::{Number, Value};

/// Decode `raw` as JSON and return its canonical byte form.
///
/// Malformed input is rejected. There is no fallback to hashing raw bytes.
pub fn canonicalize(raw: &[u8]) -> Result<Vec<u8>> {
    let value = parse(raw)?;
    Ok(canonical_bytes(&value))
}

/// Decode `raw` as a JSON value.
pub fn parse(raw: &[u8]) -> Result<Value> {
    serde_json::from_slice(raw).map_err(|e| Error::InvalidDocument(e.to_string()))
}

/// Encode an already decoded value canonically.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_value(out, item);
            }
            out.push(b'}');
        }
    }
}

/// `1`, `1.0` and `1e0` decode to the same value and encode identically.
fn write_number(out: &mut Vec<u8>, n: &Number) {
    if n.is_i64() || n.is_u64() {
        out.extend_from_slice(n.to_string().as_bytes());
        return;
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => out.push(b'0'),
        Some(f) if f.is_finite() && f.fract() == 0.0 => {
            out.extend_from_slice(format!("{f:.0}").as_bytes())
        }
        _ => out.extend_from_slice(n.to_string().as_bytes()),
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    // Serializing a &str into a Vec cannot fail.
    if let Ok(encoded) = serde_json::to_vec(s) {
        out.extend_from_slice(&encoded);
    }
}
