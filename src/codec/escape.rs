//! Order-preserving byte escaping and identifier encoding.
//!
//! Keys are built from components separated by a `0x00` delimiter. To keep
//! the delimiter unambiguous every variable-length component is escaped:
//!
//! ```text
//! 0x00  ->  0x01 0x01
//! 0x01  ->  0x01 0x02
//! ```
//!
//! The mapping is monotonic, so comparing escaped bytes gives the same order as
//! comparing the raw bytes, and because no escaped component contains `0x00`
//! a shorter component followed by the delimiter sorts before any longer
//! component sharing its prefix (`"a"·00 < "ab"·00`).
//!
//! Identifiers are `escape(tag ‖ payload)`; the tag makes every encoded
//! identifier non-empty and rejects identifiers of the wrong type on decode.

use crate::model::Value;
use crate::schema::PropertyType;
use crate::{Error, Result};

/// Separates key components.
pub const DELIMITER: u8 = 0x00;

const ESCAPE: u8 = 0x01;
const ESCAPED_DELIMITER: u8 = 0x01;
const ESCAPED_ESCAPE: u8 = 0x02;

/// Identifier type tags.
pub mod tags {
    pub const INT: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const BYTES: u8 = 0x04;
}

/// Flips the sign bit so two's complement integers sort as unsigned bytes.
const SIGN_FLIP_I64: u64 = 0x8000_0000_0000_0000;

/// Append the escaped form of `data` to `buf`.
pub fn escape_into(data: &[u8], buf: &mut Vec<u8>) {
    for &byte in data {
        match byte {
            DELIMITER => buf.extend_from_slice(&[ESCAPE, ESCAPED_DELIMITER]),
            ESCAPE => buf.extend_from_slice(&[ESCAPE, ESCAPED_ESCAPE]),
            b => buf.push(b),
        }
    }
}

pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 2);
    escape_into(data, &mut buf);
    buf
}

/// Reverse [`escape`].
pub fn unescape(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            DELIMITER => return Err(Error::CorruptKey("unescaped delimiter inside component".into())),
            ESCAPE => match iter.next() {
                Some(&ESCAPED_DELIMITER) => out.push(DELIMITER),
                Some(&ESCAPED_ESCAPE) => out.push(ESCAPE),
                Some(other) => {
                    return Err(Error::CorruptKey(format!("invalid escape sequence 0x01 0x{other:02x}")));
                }
                None => return Err(Error::CorruptKey("dangling escape byte".into())),
            },
            b => out.push(b),
        }
    }
    Ok(out)
}

/// Split off the next delimited component.
///
/// Returns `(component, rest)` where `rest` starts after the delimiter.
pub fn next_component(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let pos = data
        .iter()
        .position(|&b| b == DELIMITER)
        .ok_or_else(|| Error::CorruptKey("missing component delimiter".into()))?;
    Ok((&data[..pos], &data[pos + 1..]))
}

// ============================================================================
// Identifiers
// ============================================================================

/// Append the order-preserving encoding of an identifier (without delimiter).
///
/// Returns `false`, leaving `buf` untouched, when `value` is not of type `ty`.
pub fn encode_identifier_into(value: &Value, ty: PropertyType, buf: &mut Vec<u8>) -> bool {
    match (ty, value) {
        (PropertyType::Int, Value::Int(i)) => {
            buf.push(tags::INT);
            escape_into(&((*i as u64) ^ SIGN_FLIP_I64).to_be_bytes(), buf);
        }
        (PropertyType::String, Value::String(s)) => {
            buf.push(tags::STRING);
            escape_into(s.as_bytes(), buf);
        }
        (PropertyType::Bytes, Value::Bytes(b)) => {
            buf.push(tags::BYTES);
            escape_into(b, buf);
        }
        _ => return false,
    }
    true
}

/// Encode an identifier, or `None` when it is not of type `ty`.
pub fn encode_identifier(value: &Value, ty: PropertyType) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    encode_identifier_into(value, ty, &mut buf).then_some(buf)
}

/// Decode one escaped identifier component.
pub fn decode_identifier(component: &[u8], ty: PropertyType) -> Result<Value> {
    let raw = unescape(component)?;
    let (tag, payload) = raw
        .split_first()
        .ok_or_else(|| Error::CorruptKey("empty identifier".into()))?;
    match (ty, *tag) {
        (PropertyType::Int, tags::INT) => {
            let bytes: [u8; 8] = payload
                .try_into()
                .map_err(|_| Error::CorruptKey(format!("integer identifier of {} bytes", payload.len())))?;
            Ok(Value::Int((u64::from_be_bytes(bytes) ^ SIGN_FLIP_I64) as i64))
        }
        (PropertyType::String, tags::STRING) => String::from_utf8(payload.to_vec())
            .map(Value::String)
            .map_err(|_| Error::CorruptKey("identifier is not valid UTF-8".into())),
        (PropertyType::Bytes, tags::BYTES) => Ok(Value::Bytes(payload.to_vec())),
        (ty, tag) => Err(Error::CorruptKey(format!(
            "identifier tag 0x{tag:02x} does not match vertex type {ty:?}"
        ))),
    }
}
