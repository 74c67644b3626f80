//! Entity (vertex-attached element) in the property graph.

use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};

/// An entity: properties of one group attached to a single vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub vertex: Value,
    pub group: String,
    pub properties: PropertyMap,
}

impl Entity {
    pub fn new(group: impl Into<String>, vertex: impl Into<Value>) -> Self {
        Self {
            vertex: vertex.into(),
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
}
