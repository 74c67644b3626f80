//! # Element Codec
//!
//! Turns element properties into bytes and back, using the serializer the
//! schema registers for each property. [`merge`] combines two values of one
//! property when shards of a logical element are summarised.
//!
//! Properties are split into two slots:
//!
//! | Slot | Holds | Stored in |
//! |------|-------|-----------|
//! | `Qualifier` | `group_by` properties | trailing key qualifier |
//! | `Value` | everything else | store value |
//!
//! Each slot is framed the same way, one entry per declared property in name
//! order: `0x00` for absent, `0x01 ‖ u32 BE length ‖ bytes` for present.
//! Encoding is a pure function of the element and the schema, so encoding the
//! same element twice gives identical bytes.

pub mod escape;
pub mod merge;
pub mod serializer;

use std::sync::Arc;

use crate::model::{PropertyMap, Value};
use crate::schema::{GroupDefinition, PropertyType, Schema};
use crate::{Error, Result};

pub use merge::merge;
pub use serializer::{deserialize_value, serialize_value};

const ABSENT: u8 = 0x00;
const PRESENT: u8 = 0x01;

/// Which part of a stored entry a property lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySlot {
    Qualifier,
    Value,
}

impl PropertySlot {
    fn holds(&self, group_by: bool) -> bool {
        match self {
            PropertySlot::Qualifier => group_by,
            PropertySlot::Value => !group_by,
        }
    }
}

/// Schema-driven property and identifier codec.
#[derive(Debug, Clone)]
pub struct ElementCodec {
    schema: Arc<Schema>,
}

impl ElementCodec {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn vertex_type(&self) -> PropertyType {
        self.schema.vertex_type
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    /// Append an encoded vertex identifier to `buf`.
    pub fn encode_identifier(&self, vertex: &Value, buf: &mut Vec<u8>) -> Result<()> {
        if escape::encode_identifier_into(vertex, self.vertex_type(), buf) {
            Ok(())
        } else {
            Err(Error::UnsupportedValueType {
                property: "vertex".into(),
                value_type: vertex.type_name(),
            })
        }
    }

    pub fn decode_identifier(&self, component: &[u8]) -> Result<Value> {
        escape::decode_identifier(component, self.vertex_type())
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Every non-null property must be declared and accepted by its serializer.
    pub fn check_properties(&self, group: &GroupDefinition, props: &PropertyMap) -> Result<()> {
        for (name, value) in props {
            if value.is_null() {
                continue;
            }
            match group.property(name) {
                Some(def) if def.property_type.accepts(value) => {}
                _ => {
                    return Err(Error::UnsupportedValueType {
                        property: name.clone(),
                        value_type: value.type_name(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn serialize_properties(
        &self,
        group: &GroupDefinition,
        props: &PropertyMap,
        slot: PropertySlot,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for (name, def) in group.properties.iter().filter(|(_, d)| slot.holds(d.group_by)) {
            match props.get(name).filter(|v| !v.is_null()) {
                None => buf.push(ABSENT),
                Some(value) => {
                    let bytes = serialize_value(def.property_type, value).ok_or_else(|| {
                        Error::UnsupportedValueType {
                            property: name.clone(),
                            value_type: value.type_name(),
                        }
                    })?;
                    let len = u32::try_from(bytes.len()).map_err(|_| Error::UnsupportedValueType {
                        property: name.clone(),
                        value_type: value.type_name(),
                    })?;
                    buf.push(PRESENT);
                    buf.extend_from_slice(&len.to_be_bytes());
                    buf.extend_from_slice(&bytes);
                }
            }
        }
        Ok(buf)
    }

    /// Reverse [`serialize_properties`](Self::serialize_properties), adding
    /// the decoded properties to `out`.
    pub fn deserialize_properties_into(
        &self,
        bytes: &[u8],
        group: &GroupDefinition,
        slot: PropertySlot,
        out: &mut PropertyMap,
    ) -> Result<()> {
        let mut rest = bytes;
        for (name, def) in group.properties.iter().filter(|(_, d)| slot.holds(d.group_by)) {
            let (&marker, tail) = rest
                .split_first()
                .ok_or_else(|| Error::CorruptKey(format!("truncated before property '{name}'")))?;
            rest = tail;
            match marker {
                ABSENT => {}
                PRESENT => {
                    if rest.len() < 4 {
                        return Err(Error::CorruptKey(format!("truncated length of '{name}'")));
                    }
                    let (len, tail) = rest.split_at(4);
                    let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
                    if tail.len() < len {
                        return Err(Error::CorruptKey(format!("truncated value of '{name}'")));
                    }
                    let (raw, tail) = tail.split_at(len);
                    out.insert(name.clone(), deserialize_value(def.property_type, raw)?);
                    rest = tail;
                }
                other => {
                    return Err(Error::CorruptKey(format!(
                        "invalid presence marker 0x{other:02x} for '{name}'"
                    )));
                }
            }
        }
        if !rest.is_empty() {
            return Err(Error::CorruptKey(format!("{} trailing property bytes", rest.len())));
        }
        Ok(())
    }

    pub fn deserialize_properties(
        &self,
        bytes: &[u8],
        group: &GroupDefinition,
        slot: PropertySlot,
    ) -> Result<PropertyMap> {
        let mut out = PropertyMap::new();
        self.deserialize_properties_into(bytes, group, slot, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AggregateFunction, PropertyDefinition};

    fn group() -> GroupDefinition {
        GroupDefinition::new()
            .with_property("count", PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum))
            .with_property("name", PropertyDefinition::new(PropertyType::String, AggregateFunction::First))
            .with_property(
                "shard",
                PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum).group_by(),
            )
    }

    fn codec() -> ElementCodec {
        ElementCodec::new(Arc::new(
            Schema::new(PropertyType::String).with_edge("E", group()),
        ))
    }

    fn props() -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("count".into(), Value::Int(7));
        props.insert("shard".into(), Value::Int(3));
        props
    }

    #[test]
    fn test_slots_split_properties() {
        let codec = codec();
        let g = group();
        let q = codec.serialize_properties(&g, &props(), PropertySlot::Qualifier).unwrap();
        let v = codec.serialize_properties(&g, &props(), PropertySlot::Value).unwrap();

        let q_props = codec.deserialize_properties(&q, &g, PropertySlot::Qualifier).unwrap();
        let v_props = codec.deserialize_properties(&v, &g, PropertySlot::Value).unwrap();
        assert_eq!(q_props.get("shard"), Some(&Value::Int(3)));
        assert_eq!(q_props.len(), 1);
        assert_eq!(v_props.get("count"), Some(&Value::Int(7)));
        assert!(v_props.get("name").is_none());
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let codec = codec();
        let a = codec.serialize_properties(&group(), &props(), PropertySlot::Value).unwrap();
        let b = codec.serialize_properties(&group(), &props(), PropertySlot::Value).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_undeclared_property_is_unsupported() {
        let mut p = props();
        p.insert("colour".into(), Value::from("red"));
        assert!(matches!(
            codec().check_properties(&group(), &p),
            Err(Error::UnsupportedValueType { .. })
        ));
    }

    #[test]
    fn test_wrong_type_is_unsupported() {
        let mut p = PropertyMap::new();
        p.insert("count".into(), Value::from("seven"));
        assert!(codec().check_properties(&group(), &p).is_err());
        assert!(codec().serialize_properties(&group(), &p, PropertySlot::Value).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let codec = codec();
        let mut v = codec.serialize_properties(&group(), &props(), PropertySlot::Value).unwrap();
        v.push(0xAA);
        assert!(matches!(
            codec.deserialize_properties(&v, &group(), PropertySlot::Value),
            Err(Error::CorruptKey(_))
        ));
    }
}
