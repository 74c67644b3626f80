//! Element, seeds and seed ranges.

use serde::{Deserialize, Serialize};
use super::{Edge, Entity, PropertyMap, Value};

/// Any storable graph element.
///
/// `Null` property values are never stored. `with_property` drops them, and
/// one placed in a property map by other means does not survive encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Entity(Entity),
    Edge(Edge),
}

impl Element {
    pub fn group(&self) -> &str {
        match self {
            Element::Entity(e) => &e.group,
            Element::Edge(e) => &e.group,
        }
    }

    pub fn properties(&self) -> &PropertyMap {
        match self {
            Element::Entity(e) => &e.properties,
            Element::Edge(e) => &e.properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut PropertyMap {
        match self {
            Element::Entity(e) => &mut e.properties,
            Element::Edge(e) => &mut e.properties,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties().get(key)
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Element::Edge(_))
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Element::Edge(e) => Some(e),
            Element::Entity(_) => None,
        }
    }
}

impl From<Entity> for Element {
    fn from(e: Entity) -> Self {
        Element::Entity(e)
    }
}

impl From<Edge> for Element {
    fn from(e: Edge) -> Self {
        Element::Edge(e)
    }
}

/// A vertex identifier used to look up elements or to bound a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSeed(pub Value);

impl ElementSeed {
    pub fn new(vertex: impl Into<Value>) -> Self {
        Self(vertex.into())
    }

    pub fn vertex(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ElementSeed {
    fn from(v: Value) -> Self {
        Self(v)
    }
}

impl From<&str> for ElementSeed {
    fn from(v: &str) -> Self {
        Self(v.into())
    }
}

impl From<String> for ElementSeed {
    fn from(v: String) -> Self {
        Self(v.into())
    }
}

impl From<i32> for ElementSeed {
    fn from(v: i32) -> Self {
        Self(v.into())
    }
}

impl From<i64> for ElementSeed {
    fn from(v: i64) -> Self {
        Self(v.into())
    }
}

impl From<Vec<u8>> for ElementSeed {
    fn from(v: Vec<u8>) -> Self {
        Self(v.into())
    }
}

/// An inclusive pair of seeds. `start` sorting after `end` means "empty".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRange {
    pub start: ElementSeed,
    pub end: ElementSeed,
}

impl SeedRange {
    pub fn new(start: impl Into<ElementSeed>, end: impl Into<ElementSeed>) -> Self {
        Self { start: start.into(), end: end.into() }
    }

    /// A range covering exactly one vertex.
    pub fn point(seed: impl Into<ElementSeed>) -> Self {
        let seed = seed.into();
        Self { start: seed.clone(), end: seed }
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }
}
