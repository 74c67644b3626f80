//! # Schema
//!
//! Read-only description of the groups a graph may hold: which properties
//! each group carries, how each is serialized, how shards of one logical
//! element are merged, and which properties are part of the key.
//!
//! Schemas are defined outside this crate; this module only models them and
//! loads them from JSON:
//!
//! ```json
//! {
//!   "vertex_type": "string",
//!   "edges": {
//!     "BasicEdge": {
//!       "properties": {
//!         "count": { "type": "int", "aggregator": "sum", "group_by": true }
//!       }
//!     }
//!   }
//! }
//! ```

pub mod view;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Value;
use crate::{Error, Result};

pub use view::View;

// ============================================================================
// Property types and aggregation functions
// ============================================================================

/// The serializer registered for a property (or for vertex identifiers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    String,
    Bytes,
    DateTime,
}

impl PropertyType {
    /// Whether `value` can be written with this serializer.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (PropertyType::Bool, Value::Bool(_))
                | (PropertyType::Int, Value::Int(_))
                | (PropertyType::Float, Value::Float(_))
                | (PropertyType::String, Value::String(_))
                | (PropertyType::Bytes, Value::Bytes(_))
                | (PropertyType::DateTime, Value::DateTime(_))
        )
    }

    /// Whether this type has an order-preserving identifier encoding.
    pub fn is_identifier_type(&self) -> bool {
        matches!(self, PropertyType::Int | PropertyType::String | PropertyType::Bytes)
    }
}

/// Merge operator applied to the values of one property across shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Min,
    Max,
    /// Keep the value seen first in key order.
    #[default]
    First,
    /// Keep the value seen last in key order.
    Last,
}

impl AggregateFunction {
    fn supports(&self, ty: PropertyType) -> bool {
        match self {
            AggregateFunction::Sum => matches!(ty, PropertyType::Int | PropertyType::Float),
            _ => true,
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// One property of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub aggregator: AggregateFunction,
    /// Stored in the key qualifier rather than the value, so differing values
    /// are kept as separate shards until query-time aggregation.
    #[serde(default)]
    pub group_by: bool,
}

impl PropertyDefinition {
    pub fn new(property_type: PropertyType, aggregator: AggregateFunction) -> Self {
        Self { property_type, aggregator, group_by: false }
    }

    pub fn group_by(mut self) -> Self {
        self.group_by = true;
        self
    }
}

/// The properties of one entity or edge group, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
}

impl GroupDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, def: PropertyDefinition) -> Self {
        self.properties.insert(name.into(), def);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.get(name)
    }
}

/// Whether a group holds entities or edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Entity,
    Edge,
}

// ============================================================================
// Schema
// ============================================================================

/// The full graph schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub vertex_type: PropertyType,
    #[serde(default)]
    pub entities: BTreeMap<String, GroupDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, GroupDefinition>,
}

impl Schema {
    pub fn new(vertex_type: PropertyType) -> Self {
        Self {
            vertex_type,
            entities: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn with_entity(mut self, group: impl Into<String>, def: GroupDefinition) -> Self {
        self.entities.insert(group.into(), def);
        self
    }

    pub fn with_edge(mut self, group: impl Into<String>, def: GroupDefinition) -> Self {
        self.edges.insert(group.into(), def);
        self
    }

    /// Parse and validate a JSON schema.
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)
            .map_err(|e| Error::Schema(format!("invalid schema JSON: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn entity(&self, group: &str) -> Option<&GroupDefinition> {
        self.entities.get(group)
    }

    pub fn edge(&self, group: &str) -> Option<&GroupDefinition> {
        self.edges.get(group)
    }

    /// Look up a group of the given kind, failing with a schema error.
    pub fn group(&self, kind: GroupKind, group: &str) -> Result<&GroupDefinition> {
        let found = match kind {
            GroupKind::Entity => self.entity(group),
            GroupKind::Edge => self.edge(group),
        };
        found.ok_or_else(|| {
            let kind = match kind {
                GroupKind::Entity => "entity",
                GroupKind::Edge => "edge",
            };
            Error::Schema(format!("unknown {kind} group '{group}'"))
        })
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.vertex_type.is_identifier_type() {
            return Err(Error::Schema(format!(
                "vertex type {:?} has no order-preserving encoding",
                self.vertex_type
            )));
        }
        for (name, def) in self.entities.iter().chain(self.edges.iter()) {
            if name.is_empty() {
                return Err(Error::Schema("group names must not be empty".into()));
            }
            for (prop, pdef) in &def.properties {
                if !pdef.aggregator.supports(pdef.property_type) {
                    return Err(Error::Schema(format!(
                        "group '{name}': aggregator {:?} cannot merge {:?} property '{prop}'",
                        pdef.aggregator, pdef.property_type
                    )));
                }
            }
        }
        if let Some(dup) = self.entities.keys().find(|g| self.edges.contains_key(*g)) {
            return Err(Error::Schema(format!(
                "group '{dup}' is declared as both an entity and an edge group"
            )));
        }
        Ok(())
    }
}
