//! Canonical JSON encoding.
//!
//! Every replica hashes the bytes a transition writes, so two executions of
//! the same transition must produce identical output no matter how the value
//! was assembled. The encoder fixes each source of variation:
//!
//! - object keys are sorted by byte order, at every depth;
//! - no insignificant whitespace is emitted;
//! - integral floats are written as integers and `-0` as `0`, other floats
//!   use the shortest round-tripping form;
//! - strings go through serde_json's escaper.
//!
//! Key order is applied here rather than relying on `serde_json::Map`, whose
//! iteration order depends on the `preserve_order` feature of whichever crate
//! in the graph enables it.

use std::io::Write;

use serde::Serialize;
use serde_json::{Number, Value};

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Errors produced while canonicalizing a value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("non-finite number cannot be encoded")]
    NonFiniteNumber,
}

/// Encode a JSON value canonically.
pub fn to_canonical_vec(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut out = Vec::with_capacity(128);
    write_value(&mut out, value)?;
    Ok(out)
}

/// Encode a JSON value canonically, as a string.
pub fn to_canonical_string(value: &Value) -> Result<String, CanonicalError> {
    let bytes = to_canonical_vec(value)?;
    // The encoder only emits UTF-8.
    String::from_utf8(bytes).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

/// Serialize any value through JSON and encode it canonically.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Serialization(e.to_string()))?;
    to_canonical_vec(&value)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key)?;
                out.push(b':');
                write_value(out, item)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), CanonicalError> {
    serde_json::to_writer(&mut *out, s).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

fn write_number(out: &mut Vec<u8>, n: &Number) -> Result<(), CanonicalError> {
    if let Some(i) = n.as_i64() {
        return write!(out, "{i}").map_err(|e| CanonicalError::Serialization(e.to_string()));
    }
    if let Some(u) = n.as_u64() {
        return write!(out, "{u}").map_err(|e| CanonicalError::Serialization(e.to_string()));
    }
    let f = n.as_f64().ok_or(CanonicalError::NonFiniteNumber)?;
    if !f.is_finite() {
        return Err(CanonicalError::NonFiniteNumber);
    }
    if f == 0.0 {
        out.push(b'0');
        return Ok(());
    }
    if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        return write!(out, "{}", f as i64)
            .map_err(|e| CanonicalError::Serialization(e.to_string()));
    }
    serde_json::to_writer(&mut *out, &f).map_err(|e| CanonicalError::Serialization(e.to_string()))
}
