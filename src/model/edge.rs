//! Edge in the property graph.

use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};

/// An edge between two vertices, directed or undirected.
///
/// Undirected edges have no meaningful orientation: `A - B` equals `B - A`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: Value,
    pub destination: Value,
    pub directed: bool,
    pub group: String,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn new(
        group: impl Into<String>,
        source: impl Into<Value>,
        destination: impl Into<Value>,
        directed: bool,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            directed,
            group: group.into(),
            properties: PropertyMap::new(),
        }
    }

    /// Set a property. `Null` means absent and removes it.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let (key, value) = (key.into(), value.into());
        if value.is_null() {
            self.properties.remove(&key);
        } else {
            self.properties.insert(key, value);
        }
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.destination
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        if self.group != other.group
            || self.directed != other.directed
            || self.properties != other.properties
        {
            return false;
        }
        let same_way = self.source == other.source && self.destination == other.destination;
        if self.directed {
            same_way
        } else {
            same_way || (self.source == other.destination && self.destination == other.source)
        }
    }
}
