//! Order-preserving encoding of identity values into map keys.
//!
//! A key is a type tag followed by a body whose byte order matches the
//! value order, so integer identities scan numerically and text identities
//! lexicographically. Tags group values of one type together.

use crate::error::{CoreError, CoreResult};
use tessera_codec::Value;

const TAG_BOOL: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;

const SIGN_BIT: u64 = 1 << 63;

/// Encodes an identity value as a map key.
///
/// # Errors
///
/// Returns [`CoreError::InvalidOperation`] for null, arrays, maps and NaN,
/// which cannot identify a document.
pub(crate) fn encode_key(id: &Value) -> CoreResult<Vec<u8>> {
    let mut key = Vec::with_capacity(9);
    match id {
        Value::Bool(b) => {
            key.push(TAG_BOOL);
            key.push(u8::from(*b));
        }
        Value::Integer(n) => {
            key.push(TAG_INTEGER);
            key.extend_from_slice(&((*n as u64) ^ SIGN_BIT).to_be_bytes());
        }
        Value::Float(f) if f.is_nan() => {
            return Err(CoreError::invalid_operation("NaN cannot be an identity"));
        }
        Value::Float(f) => {
            // -0.0 and 0.0 identify the same document
            let bits = if *f == 0.0 { 0 } else { f.to_bits() };
            let ordered = if bits & SIGN_BIT == 0 {
                bits | SIGN_BIT
            } else {
                !bits
            };
            key.push(TAG_FLOAT);
            key.extend_from_slice(&ordered.to_be_bytes());
        }
        Value::Text(s) => {
            key.push(TAG_TEXT);
            key.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            key.push(TAG_BYTES);
            key.extend_from_slice(b);
        }
        Value::Null | Value::Array(_) | Value::Map(_) => {
            return Err(CoreError::invalid_operation(format!(
                "a {} value cannot be an identity",
                id.type_name()
            )));
        }
    }
    Ok(key)
}

/// Renders an identity for error messages.
pub(crate) fn display_key(id: &Value) -> String {
    match id {
        Value::Text(s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("{other:?}"),
    }
}
