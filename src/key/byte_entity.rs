//! Byte-entity key layout.
//!
//! ```text
//! entity: id(v)·00 01·00                 esc(group)·00 qualifier
//! edge:   id(v)·00 F ·00 id(other)·00 F·00 esc(group)·00 qualifier
//! ```
//!
//! The flag right after the row vertex sorts a vertex's keys as entities,
//! outgoing, incoming, then undirected edges, so a single-vertex lookup can
//! scan each direction as its own sub-range. The flag is repeated after the
//! other endpoint and must match on decode.

use crate::codec::escape::{self, DELIMITER};
use crate::codec::ElementCodec;
use crate::model::{Element, ElementSeed};
use crate::{Error, Result};

use super::{
    element_parts, encode_seed, encode_vertex, push_tail, split_flag, split_tail, ByteRange,
    EncodedKeys, KeyHeader, KeyKind, KeyPackage, KeyPackageKind, KeySpace,
};

/// Discriminator bytes.
pub mod flags {
    pub const ENTITY: u8 = 0x01;
    pub const OUTGOING: u8 = 0x02;
    pub const INCOMING: u8 = 0x03;
    pub const UNDIRECTED: u8 = 0x04;
}

fn kind_of(flag: u8) -> Result<KeyKind> {
    match flag {
        flags::ENTITY => Ok(KeyKind::Entity),
        flags::OUTGOING => Ok(KeyKind::Outgoing),
        flags::INCOMING => Ok(KeyKind::Incoming),
        flags::UNDIRECTED => Ok(KeyKind::Undirected),
        other => Err(Error::CorruptKey(format!("unknown discriminator 0x{other:02x}"))),
    }
}

/// Key package that marks entities and edge directions with a flag byte.
#[derive(Debug, Clone)]
pub struct ByteEntityKeyPackage {
    codec: ElementCodec,
}

impl ByteEntityKeyPackage {
    pub fn new(codec: ElementCodec) -> Self {
        Self { codec }
    }

    fn edge_key(row: &[u8], flag: u8, other: &[u8], group: &str, qualifier: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(row.len() + other.len() + group.len() + qualifier.len() + 8);
        key.extend_from_slice(row);
        key.extend_from_slice(&[DELIMITER, flag, DELIMITER]);
        key.extend_from_slice(other);
        key.extend_from_slice(&[DELIMITER, flag, DELIMITER]);
        push_tail(&mut key, group, qualifier);
        key
    }

    fn flag_prefix(vertex: &[u8], flag: u8) -> Vec<u8> {
        let mut prefix = vertex.to_vec();
        prefix.extend_from_slice(&[DELIMITER, flag, DELIMITER]);
        prefix
    }
}

impl KeyPackage for ByteEntityKeyPackage {
    fn kind(&self) -> KeyPackageKind {
        KeyPackageKind::ByteEntity
    }

    fn codec(&self) -> &ElementCodec {
        &self.codec
    }

    fn encode_element(&self, element: &Element) -> Result<EncodedKeys> {
        let parts = element_parts(&self.codec, element)?;
        let mut keys = EncodedKeys::new();
        match element {
            Element::Entity(entity) => {
                let mut key = Self::flag_prefix(&encode_vertex(&self.codec, &entity.vertex)?, flags::ENTITY);
                push_tail(&mut key, parts.group, &parts.qualifier);
                keys.push((key, parts.value));
            }
            Element::Edge(edge) => {
                let source = encode_vertex(&self.codec, &edge.source)?;
                let destination = encode_vertex(&self.codec, &edge.destination)?;
                let (out_flag, in_flag) = if edge.directed {
                    (flags::OUTGOING, flags::INCOMING)
                } else {
                    (flags::UNDIRECTED, flags::UNDIRECTED)
                };
                let first = Self::edge_key(&source, out_flag, &destination, parts.group, &parts.qualifier);
                if edge.is_self_loop() {
                    keys.push((first, parts.value));
                } else {
                    let second = Self::edge_key(&destination, in_flag, &source, parts.group, &parts.qualifier);
                    keys.push((first, parts.value.clone()));
                    keys.push((second, parts.value));
                }
            }
        }
        Ok(keys)
    }

    fn header<'k>(&self, key: &'k [u8]) -> Result<KeyHeader<'k>> {
        let (vertex, rest) = escape::next_component(key)?;
        let (flag, rest) = split_flag(rest)?;
        let kind = kind_of(flag)?;
        let (other, rest) = if kind == KeyKind::Entity {
            (None, rest)
        } else {
            let (other, rest) = escape::next_component(rest)?;
            let (repeated, rest) = split_flag(rest)?;
            if repeated != flag {
                return Err(Error::CorruptKey(format!(
                    "discriminators disagree: 0x{flag:02x} vs 0x{repeated:02x}"
                )));
            }
            (Some(other), rest)
        };
        if vertex.is_empty() || other.is_some_and(|o| o.is_empty()) {
            return Err(Error::CorruptKey("empty vertex component".into()));
        }
        let (group, qualifier) = split_tail(rest)?;
        Ok(KeyHeader {
            kind,
            vertex,
            other,
            group,
            qualifier,
            prefix_len: key.len() - qualifier.len(),
        })
    }

    fn seed_ranges(&self, seed: &ElementSeed, space: KeySpace) -> Result<Vec<ByteRange>> {
        let vertex = encode_seed(&self.codec, seed)?;
        let mut ranges = Vec::new();
        if space.entities {
            ranges.push(ByteRange::prefix(Self::flag_prefix(&vertex, flags::ENTITY)));
        }
        if space.outgoing {
            ranges.push(ByteRange::prefix(Self::flag_prefix(&vertex, flags::OUTGOING)));
        }
        if space.incoming {
            ranges.push(ByteRange::prefix(Self::flag_prefix(&vertex, flags::INCOMING)));
            if !space.outgoing {
                // Directed self-loops are stored once, under the outgoing flag.
                let mut self_loop = Self::flag_prefix(&vertex, flags::OUTGOING);
                self_loop.extend_from_slice(&vertex);
                self_loop.push(DELIMITER);
                ranges.push(ByteRange::prefix(self_loop));
            }
        }
        if space.undirected {
            ranges.push(ByteRange::prefix(Self::flag_prefix(&vertex, flags::UNDIRECTED)));
        }
        Ok(ranges)
    }
}
