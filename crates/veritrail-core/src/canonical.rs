//! Canonical JSON encoding for deterministic hashing of structured records.
//!
//! Records are first lowered to a [`ciborium::value::Value`] tree through
//! serde, then written out with these rules:
//! - Map keys are text (integer keys are rendered in decimal), sorted by
//!   their UTF-8 bytes, and must be unique
//! - Integers are written in plain decimal
//! - Floats use the shortest round-trip form and must be finite;
//!   `-0.0` is written as `0.0`
//! - Strings use JSON escaping as produced by `serde_json`
//! - Byte strings are written as lowercase hex strings
//! - No whitespace anywhere
//!
//! Two records that differ only in map key order encode to identical bytes.

use ciborium::value::Value;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Maximum nesting depth accepted by the encoder.
pub const MAX_DEPTH: usize = 128;

/// Encode any serializable record to canonical bytes.
pub fn canonicalize<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>> {
    let value = Value::serialized(record).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    canonical_value_bytes(&value)
}

/// Encode an already-lowered value tree to canonical bytes.
pub fn canonical_value_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value, 0)?;
    Ok(buf)
}

/// Recursively encode a value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(CoreError::EncodingError(format!(
            "nesting deeper than {} levels",
            MAX_DEPTH
        )));
    }

    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            buf.extend_from_slice(n.to_string().as_bytes());
        }
        Value::Float(f) => encode_float(buf, *f)?,
        Value::Text(s) => encode_text(buf, s)?,
        Value::Bytes(b) => encode_text(buf, &hex::encode(b))?,
        Value::Array(items) => {
            buf.push(b'[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    buf.push(b',');
                }
                encode_value_to(buf, item, depth + 1)?;
            }
            buf.push(b']');
        }
        Value::Map(entries) => encode_map(buf, entries, depth)?,
        Value::Tag(tag, _) => {
            return Err(CoreError::EncodingError(format!(
                "tagged value {} has no canonical form",
                tag
            )));
        }
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported value type".into(),
            ));
        }
    }
    Ok(())
}

/// Encode a float in shortest round-trip form.
fn encode_float(buf: &mut Vec<u8>, f: f64) -> Result<()> {
    if !f.is_finite() {
        return Err(CoreError::EncodingError(format!(
            "non-finite number {} has no canonical form",
            f
        )));
    }
    // Normalizes -0.0 to 0.0.
    let f = if f == 0.0 { 0.0 } else { f };
    buf.extend_from_slice(format!("{:?}", f).as_bytes());
    Ok(())
}

/// Encode a string with JSON escaping.
fn encode_text(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let quoted = serde_json::to_string(s).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    buf.extend_from_slice(quoted.as_bytes());
    Ok(())
}

/// Encode a map with keys sorted by their UTF-8 bytes.
fn encode_map(buf: &mut Vec<u8>, entries: &[(Value, Value)], depth: usize) -> Result<()> {
    let mut pairs: Vec<(String, &Value)> = entries
        .iter()
        .map(|(k, v)| Ok((map_key(k)?, v)))
        .collect::<Result<_>>()?;

    pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    if let Some(dup) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(CoreError::EncodingError(format!(
            "duplicate map key {:?}",
            dup[0].0
        )));
    }

    buf.push(b'{');
    for (idx, (key, value)) in pairs.into_iter().enumerate() {
        if idx > 0 {
            buf.push(b',');
        }
        encode_text(buf, &key)?;
        buf.push(b':');
        encode_value_to(buf, value, depth + 1)?;
    }
    buf.push(b'}');
    Ok(())
}

/// Render a map key as text.
fn map_key(key: &Value) -> Result<String> {
    match key {
        Value::Text(s) => Ok(s.clone()),
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            Ok(n.to_string())
        }
        _ => Err(CoreError::EncodingError(
            "map keys must be text or integers".into(),
        )),
    }
}
