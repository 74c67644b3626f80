//! # Key Packages
//!
//! A key package is THE contract between graph elements and sorted store
//! keys: it decides the byte layout of every stored entry and the byte ranges
//! a vertex lookup has to scan.
//!
//! ## Implementations
//!
//! | Package | Module | Entity vs edge marker |
//! |---------|--------|-----------------------|
//! | `ByteEntityKeyPackage` | `byte_entity` | flag byte right after the row vertex |
//! | `ClassicKeyPackage` | `classic` | component count of the row |
//!
//! Both layouts start every key with `id(row vertex)·0x00`, so all keys of one
//! vertex are contiguous and a range of vertices is one contiguous byte range.
//! Every edge is written under both of its endpoints (once for self-loops),
//! which is what lets a lookup find incoming as well as outgoing edges.
//!
//! The package is picked once when a store is opened; the retriever and range
//! builder only ever talk to `dyn KeyPackage`.

pub mod byte_entity;
pub mod classic;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::codec::escape::{self, DELIMITER};
use crate::codec::{ElementCodec, PropertySlot};
use crate::model::{Edge, Element, ElementSeed, Entity, SeedRange, Value};
use crate::schema::{GroupDefinition, GroupKind, Schema};
use crate::storage::KeyValue;
use crate::{Error, Result};

pub use byte_entity::ByteEntityKeyPackage;
pub use classic::ClassicKeyPackage;

/// The entries one element is written as (one per endpoint row).
pub type EncodedKeys = SmallVec<[KeyValue; 2]>;

// ============================================================================
// Package selection
// ============================================================================

/// Which key layout a store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPackageKind {
    #[default]
    ByteEntity,
    Classic,
}

impl KeyPackageKind {
    pub fn name(&self) -> &'static str {
        match self {
            KeyPackageKind::ByteEntity => "byte_entity",
            KeyPackageKind::Classic => "classic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "byte_entity" => Some(KeyPackageKind::ByteEntity),
            "classic" => Some(KeyPackageKind::Classic),
            _ => None,
        }
    }

    /// Instantiate the package for a schema.
    pub fn build(self, schema: Arc<Schema>) -> Arc<dyn KeyPackage> {
        let codec = ElementCodec::new(schema);
        match self {
            KeyPackageKind::ByteEntity => Arc::new(ByteEntityKeyPackage::new(codec)),
            KeyPackageKind::Classic => Arc::new(ClassicKeyPackage::new(codec)),
        }
    }
}

impl fmt::Display for KeyPackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Byte ranges
// ============================================================================

/// Half-open byte range `[start, end)` to scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl ByteRange {
    pub fn new(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self { start, end }
    }

    /// Every key starting with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = prefix_successor(&prefix);
        Self { start: prefix, end }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.end.is_empty() || key < self.end.as_slice())
    }

    /// An empty `end` means unbounded.
    pub fn is_empty(&self) -> bool {
        !self.end.is_empty() && self.start >= self.end
    }

    /// Sort and merge overlapping or touching ranges so no key is covered twice.
    pub fn coalesce(mut ranges: Vec<ByteRange>) -> Vec<ByteRange> {
        ranges.retain(|r| !r.is_empty());
        ranges.sort_by(|a, b| a.start.cmp(&b.start));
        let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if last.end.is_empty() => {}
                Some(last) if range.start <= last.end => {
                    if range.end.is_empty() || range.end > last.end {
                        last.end = range.end;
                    }
                }
                _ => merged.push(range),
            }
        }
        merged
    }
}

/// Smallest byte string greater than every string prefixed by `prefix`.
///
/// Empty when there is none (all `0xFF`), meaning "unbounded".
pub fn prefix_successor(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return end;
        }
    }
    end
}

// ============================================================================
// Key headers
// ============================================================================

/// What a key says about its element, from the point of view of its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Entity,
    /// Directed edge; the row vertex is the source.
    Outgoing,
    /// Directed edge; the row vertex is the destination.
    Incoming,
    Undirected,
}

impl KeyKind {
    pub fn group_kind(&self) -> GroupKind {
        match self {
            KeyKind::Entity => GroupKind::Entity,
            _ => GroupKind::Edge,
        }
    }
}

/// The parts of a key, borrowed, without decoding any property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHeader<'k> {
    pub kind: KeyKind,
    /// Encoded identifier of the row vertex.
    pub vertex: &'k [u8],
    /// Encoded identifier of the other endpoint (edges only).
    pub other: Option<&'k [u8]>,
    /// Escaped group name.
    pub group: &'k [u8],
    pub qualifier: &'k [u8],
    /// Length of the logical prefix: everything before the qualifier.
    pub prefix_len: usize,
}

impl KeyHeader<'_> {
    pub fn is_self_loop(&self) -> bool {
        self.other == Some(self.vertex)
    }
}

/// Which kinds of key a vertex lookup needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySpace {
    pub entities: bool,
    pub outgoing: bool,
    pub incoming: bool,
    pub undirected: bool,
}

impl KeySpace {
    pub const ALL: KeySpace = KeySpace { entities: true, outgoing: true, incoming: true, undirected: true };

    pub fn any_edges(&self) -> bool {
        self.outgoing || self.incoming || self.undirected
    }

    pub fn is_empty(&self) -> bool {
        !self.entities && !self.any_edges()
    }
}

// ============================================================================
// KeyPackage trait
// ============================================================================

/// Byte layout strategy for one store.
pub trait KeyPackage: Send + Sync + fmt::Debug {
    fn kind(&self) -> KeyPackageKind;

    fn codec(&self) -> &ElementCodec;

    /// Encode an element into the entries stored for it.
    fn encode_element(&self, element: &Element) -> Result<EncodedKeys>;

    /// Parse the structure of a key.
    fn header<'k>(&self, key: &'k [u8]) -> Result<KeyHeader<'k>>;

    /// Byte ranges holding the requested kinds of key for one vertex.
    fn seed_ranges(&self, seed: &ElementSeed, space: KeySpace) -> Result<Vec<ByteRange>>;

    /// Decode a stored entry back into an element.
    fn decode(&self, key: &[u8], value: &[u8]) -> Result<Element> {
        let header = self.header(key)?;
        decode_with_header(self.codec(), &header, value)
    }

    /// The byte range holding every key whose row vertex lies in `range`.
    ///
    /// `Ok(None)` when `start` sorts after `end`.
    fn range_bounds(&self, range: &SeedRange) -> Result<Option<ByteRange>> {
        let start = encode_seed(self.codec(), &range.start)?;
        let end = encode_seed(self.codec(), &range.end)?;
        if self.compare(&start, &end) == Ordering::Greater {
            return Ok(None);
        }
        // id(start)·00 <= key < id(end)·01 covers exactly the vertices in between.
        let mut lower = start;
        lower.push(DELIMITER);
        let mut upper = end;
        upper.push(DELIMITER + 1);
        Ok(Some(ByteRange::new(lower, upper)))
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    /// The aggregation-key projection: the key without its qualifier.
    fn logical_prefix<'k>(&self, key: &'k [u8]) -> Result<&'k [u8]> {
        let header = self.header(key)?;
        Ok(&key[..header.prefix_len])
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Encode a seed identifier for range building.
pub(crate) fn encode_seed(codec: &ElementCodec, seed: &ElementSeed) -> Result<Vec<u8>> {
    escape::encode_identifier(seed.vertex(), codec.vertex_type()).ok_or_else(|| {
        Error::InvalidRange(format!(
            "seed {} of type {} does not match vertex type {:?}",
            seed.vertex(),
            seed.vertex().type_name(),
            codec.vertex_type()
        ))
    })
}

/// Encoded pieces of an element that every layout needs.
pub(crate) struct ElementParts<'e> {
    pub group: &'e str,
    pub qualifier: Vec<u8>,
    pub value: Vec<u8>,
}

pub(crate) fn element_parts<'e>(codec: &ElementCodec, element: &'e Element) -> Result<ElementParts<'e>> {
    let kind = match element {
        Element::Entity(_) => GroupKind::Entity,
        Element::Edge(_) => GroupKind::Edge,
    };
    let def = codec.schema().group(kind, element.group())?;
    codec.check_properties(def, element.properties())?;
    Ok(ElementParts {
        group: element.group(),
        qualifier: codec.serialize_properties(def, element.properties(), PropertySlot::Qualifier)?,
        value: codec.serialize_properties(def, element.properties(), PropertySlot::Value)?,
    })
}

pub(crate) fn encode_vertex(codec: &ElementCodec, vertex: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    codec.encode_identifier(vertex, &mut buf)?;
    Ok(buf)
}

/// Append `esc(group)·00 qualifier`.
pub(crate) fn push_tail(key: &mut Vec<u8>, group: &str, qualifier: &[u8]) {
    escape::escape_into(group.as_bytes(), key);
    key.push(DELIMITER);
    key.extend_from_slice(qualifier);
}

/// Split `esc(group)·00 qualifier`, rejecting an empty group.
pub(crate) fn split_tail(rest: &[u8]) -> Result<(&[u8], &[u8])> {
    let (group, qualifier) = escape::next_component(rest)?;
    if group.is_empty() {
        return Err(Error::CorruptKey("empty group component".into()));
    }
    Ok((group, qualifier))
}

/// Read a one-byte component.
pub(crate) fn split_flag(rest: &[u8]) -> Result<(u8, &[u8])> {
    match escape::next_component(rest)? {
        ([flag], tail) => Ok((*flag, tail)),
        (other, _) => Err(Error::CorruptKey(format!(
            "discriminator of {} bytes, expected 1",
            other.len()
        ))),
    }
}

fn group_definition<'s>(codec: &'s ElementCodec, kind: GroupKind, group: &str) -> Result<&'s GroupDefinition> {
    codec
        .schema()
        .group(kind, group)
        .map_err(|_| Error::CorruptKey(format!("stored group '{group}' is not in the schema")))
}

pub(crate) fn decode_with_header(codec: &ElementCodec, header: &KeyHeader<'_>, value: &[u8]) -> Result<Element> {
    let group = String::from_utf8(escape::unescape(header.group)?)
        .map_err(|_| Error::CorruptKey("group name is not valid UTF-8".into()))?;
    let def = group_definition(codec, header.kind.group_kind(), &group)?;

    let mut properties = codec.deserialize_properties(header.qualifier, def, PropertySlot::Qualifier)?;
    codec.deserialize_properties_into(value, def, PropertySlot::Value, &mut properties)?;

    let vertex = codec.decode_identifier(header.vertex)?;
    let other = match header.other {
        Some(other) => Some(codec.decode_identifier(other)?),
        None => None,
    };

    let element = match (header.kind, other) {
        (KeyKind::Entity, None) => Element::Entity(Entity { vertex, group, properties }),
        (KeyKind::Outgoing, Some(other)) => Element::Edge(Edge {
            source: vertex,
            destination: other,
            directed: true,
            group,
            properties,
        }),
        (KeyKind::Incoming, Some(other)) => Element::Edge(Edge {
            source: other,
            destination: vertex,
            directed: true,
            group,
            properties,
        }),
        (KeyKind::Undirected, Some(other)) => Element::Edge(Edge {
            source: vertex,
            destination: other,
            directed: false,
            group,
            properties,
        }),
        (kind, _) => {
            return Err(Error::CorruptKey(format!("{kind:?} key with mismatched endpoints")));
        }
    };
    Ok(element)
}
