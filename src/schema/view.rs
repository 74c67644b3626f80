//! View: the groups a query asks for.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::Schema;
use crate::{Error, Result};

/// Named entity and edge groups to include in a query's results.
///
/// Groups not named here are excluded entirely, whether or not they exist in
/// storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub entities: BTreeSet<String>,
    #[serde(default)]
    pub edges: BTreeSet<String>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, group: impl Into<String>) -> Self {
        self.entities.insert(group.into());
        self
    }

    pub fn edge(mut self, group: impl Into<String>) -> Self {
        self.edges.insert(group.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Schema(format!("invalid view JSON: {e}")))
    }

    /// A view naming no groups at all selects nothing.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    /// Every named group must be declared, with the same kind, in the schema.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if let Some(g) = self.entities.iter().find(|g| schema.entity(g).is_none()) {
            return Err(Error::Schema(format!("view names unknown entity group '{g}'")));
        }
        if let Some(g) = self.edges.iter().find(|g| schema.edge(g).is_none()) {
            return Err(Error::Schema(format!("view names unknown edge group '{g}'")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GroupDefinition, PropertyType};

    #[test]
    fn test_empty_view() {
        assert!(View::new().is_empty());
        assert!(!View::new().edge("E").is_empty());
    }

    #[test]
    fn test_view_from_json() {
        let view = View::from_json(r#"{ "edges": ["E"] }"#).unwrap();
        assert!(view.edges.contains("E"));
        assert!(view.entities.is_empty());
    }

    #[test]
    fn test_validate_against_schema() {
        let schema = Schema::new(PropertyType::String).with_edge("E", GroupDefinition::new());
        assert!(View::new().edge("E").validate(&schema).is_ok());
        assert!(View::new().entity("E").validate(&schema).is_err());
        assert!(View::new().edge("F").validate(&schema).is_err());
    }
}
