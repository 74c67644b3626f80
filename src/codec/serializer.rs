//! Per-type property serializers.

use chrono::DateTime;

use crate::model::Value;
use crate::schema::PropertyType;
use crate::{Error, Result};

/// Serialize `value` with the serializer registered for `ty`.
///
/// `None` when the value is not of that type.
pub fn serialize_value(ty: PropertyType, value: &Value) -> Option<Vec<u8>> {
    let bytes = match (ty, value) {
        (PropertyType::Bool, Value::Bool(b)) => vec![u8::from(*b)],
        (PropertyType::Int, Value::Int(i)) => i.to_be_bytes().to_vec(),
        (PropertyType::Float, Value::Float(f)) => f.to_bits().to_be_bytes().to_vec(),
        (PropertyType::String, Value::String(s)) => s.as_bytes().to_vec(),
        (PropertyType::Bytes, Value::Bytes(b)) => b.clone(),
        (PropertyType::DateTime, Value::DateTime(dt)) => {
            let mut buf = Vec::with_capacity(12);
            buf.extend_from_slice(&dt.timestamp().to_be_bytes());
            buf.extend_from_slice(&dt.timestamp_subsec_nanos().to_be_bytes());
            buf
        }
        _ => return None,
    };
    Some(bytes)
}

fn fixed<const N: usize>(ty: PropertyType, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::CorruptKey(format!("{ty:?} property of {} bytes, expected {N}", bytes.len())))
}

/// Reverse [`serialize_value`].
pub fn deserialize_value(ty: PropertyType, bytes: &[u8]) -> Result<Value> {
    Ok(match ty {
        PropertyType::Bool => match fixed::<1>(ty, bytes)? {
            [0] => Value::Bool(false),
            [1] => Value::Bool(true),
            [b] => return Err(Error::CorruptKey(format!("invalid boolean byte 0x{b:02x}"))),
        },
        PropertyType::Int => Value::Int(i64::from_be_bytes(fixed(ty, bytes)?)),
        PropertyType::Float => Value::Float(f64::from_bits(u64::from_be_bytes(fixed(ty, bytes)?))),
        PropertyType::String => Value::String(
            String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::CorruptKey("string property is not valid UTF-8".into()))?,
        ),
        PropertyType::Bytes => Value::Bytes(bytes.to_vec()),
        PropertyType::DateTime => {
            let raw: [u8; 12] = fixed(ty, bytes)?;
            let mut secs = [0u8; 8];
            let mut nanos = [0u8; 4];
            secs.copy_from_slice(&raw[..8]);
            nanos.copy_from_slice(&raw[8..]);
            let dt = DateTime::from_timestamp(i64::from_be_bytes(secs), u32::from_be_bytes(nanos))
                .ok_or_else(|| Error::CorruptKey("datetime out of range".into()))?;
            Value::DateTime(dt)
        }
    })
}
