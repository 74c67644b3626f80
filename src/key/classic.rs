//! Classic key layout.
//!
//! ```text
//! entity: id(v)·00                       ·00 esc(group)·00 qualifier
//! edge:   id(row)·00 id(other)·00 F·00   ·00 esc(group)·00 qualifier
//! ```
//!
//! The row ends at the first empty component. An entity row has one
//! component, an edge row three. Encoded identifiers are never empty, so the
//! component straight after the row vertex tells the two apart, and entities
//! of a vertex sort before its edges.
//!
//! Unlike the byte-entity layout, the direction flag comes after the other
//! endpoint, so a single-vertex lookup cannot skip edges by direction; the
//! inclusion filter drops the unwanted ones instead.

use crate::codec::escape::{self, DELIMITER};
use crate::codec::ElementCodec;
use crate::model::{Element, ElementSeed};
use crate::{Error, Result};

use super::{
    element_parts, encode_seed, encode_vertex, prefix_successor, push_tail, split_flag, split_tail,
    ByteRange, EncodedKeys, KeyHeader, KeyKind, KeyPackage, KeyPackageKind, KeySpace,
};

/// Direction flags.
pub mod flags {
    pub const UNDIRECTED: u8 = 0x01;
    /// Row vertex is the source.
    pub const DIRECTED: u8 = 0x02;
    /// Row vertex is the destination.
    pub const REVERSED: u8 = 0x03;
}

fn kind_of(flag: u8) -> Result<KeyKind> {
    match flag {
        flags::UNDIRECTED => Ok(KeyKind::Undirected),
        flags::DIRECTED => Ok(KeyKind::Outgoing),
        flags::REVERSED => Ok(KeyKind::Incoming),
        other => Err(Error::CorruptKey(format!("unknown direction flag 0x{other:02x}"))),
    }
}

/// Key package with the direction flag inside a three-part edge row.
#[derive(Debug, Clone)]
pub struct ClassicKeyPackage {
    codec: ElementCodec,
}

impl ClassicKeyPackage {
    pub fn new(codec: ElementCodec) -> Self {
        Self { codec }
    }

    fn edge_key(row: &[u8], other: &[u8], flag: u8, group: &str, qualifier: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(row.len() + other.len() + group.len() + qualifier.len() + 8);
        key.extend_from_slice(row);
        key.push(DELIMITER);
        key.extend_from_slice(other);
        key.extend_from_slice(&[DELIMITER, flag, DELIMITER, DELIMITER]);
        push_tail(&mut key, group, qualifier);
        key
    }
}

impl KeyPackage for ClassicKeyPackage {
    fn kind(&self) -> KeyPackageKind {
        KeyPackageKind::Classic
    }

    fn codec(&self) -> &ElementCodec {
        &self.codec
    }

    fn encode_element(&self, element: &Element) -> Result<EncodedKeys> {
        let parts = element_parts(&self.codec, element)?;
        let mut keys = EncodedKeys::new();
        match element {
            Element::Entity(entity) => {
                let mut key = encode_vertex(&self.codec, &entity.vertex)?;
                key.extend_from_slice(&[DELIMITER, DELIMITER]);
                push_tail(&mut key, parts.group, &parts.qualifier);
                keys.push((key, parts.value));
            }
            Element::Edge(edge) => {
                let source = encode_vertex(&self.codec, &edge.source)?;
                let destination = encode_vertex(&self.codec, &edge.destination)?;
                let (forward, reverse) = if edge.directed {
                    (flags::DIRECTED, flags::REVERSED)
                } else {
                    (flags::UNDIRECTED, flags::UNDIRECTED)
                };
                let first = Self::edge_key(&source, &destination, forward, parts.group, &parts.qualifier);
                if edge.is_self_loop() {
                    keys.push((first, parts.value));
                } else {
                    let second = Self::edge_key(&destination, &source, reverse, parts.group, &parts.qualifier);
                    keys.push((first, parts.value.clone()));
                    keys.push((second, parts.value));
                }
            }
        }
        Ok(keys)
    }

    fn header<'k>(&self, key: &'k [u8]) -> Result<KeyHeader<'k>> {
        let (vertex, rest) = escape::next_component(key)?;
        if vertex.is_empty() {
            return Err(Error::CorruptKey("empty row vertex".into()));
        }
        let (second, rest) = escape::next_component(rest)?;
        let (kind, other, rest) = if second.is_empty() {
            (KeyKind::Entity, None, rest)
        } else {
            let (flag, rest) = split_flag(rest)?;
            let (terminator, rest) = escape::next_component(rest)?;
            if !terminator.is_empty() {
                return Err(Error::CorruptKey("edge row has more than three components".into()));
            }
            (kind_of(flag)?, Some(second), rest)
        };
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
        let mut row = encode_seed(&self.codec, seed)?;
        row.push(DELIMITER);
        let range = match (space.entities, space.any_edges()) {
            (true, true) => ByteRange::prefix(row),
            (true, false) => {
                row.push(DELIMITER);
                ByteRange::prefix(row)
            }
            (false, true) => {
                // Edges follow the entity terminator: id·00·01 up to id·01.
                let end = prefix_successor(&row);
                row.push(DELIMITER + 1);
                ByteRange::new(row, end)
            }
            (false, false) => return Ok(Vec::new()),
        };
        Ok(vec![range])
    }
}
