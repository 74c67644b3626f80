//! Direction and inclusion filtering.
//!
//! An [`InclusionFilter`] decides from a key's header alone whether the
//! element it stores belongs in a result. Direction is always relative to the
//! key's row vertex: with [`IncludeIncomingOutgoing::Outgoing`] a directed
//! edge is kept only when it is read from its source's row.
//!
//! Undirected edges pass any direction setting. A directed self-loop counts
//! as both incoming and outgoing.

use std::sync::Arc;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::codec::escape;
use crate::key::{KeyHeader, KeyKind, KeyPackage, KeySpace};
use crate::schema::View;
use crate::storage::{RawStream, ScanIterator};

/// Which directed edges to return, relative to the row vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeIncomingOutgoing {
    Incoming,
    Outgoing,
    #[default]
    Both,
}

impl IncludeIncomingOutgoing {
    fn wants_outgoing(&self) -> bool {
        !matches!(self, IncludeIncomingOutgoing::Incoming)
    }

    fn wants_incoming(&self) -> bool {
        !matches!(self, IncludeIncomingOutgoing::Outgoing)
    }
}

/// Which kinds of edge to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeEdgeType {
    #[default]
    All,
    Directed,
    Undirected,
    None,
}

impl IncludeEdgeType {
    fn wants_directed(&self) -> bool {
        matches!(self, IncludeEdgeType::All | IncludeEdgeType::Directed)
    }

    fn wants_undirected(&self) -> bool {
        matches!(self, IncludeEdgeType::All | IncludeEdgeType::Undirected)
    }
}

/// Key-level predicate built once per operation.
#[derive(Debug, Clone)]
pub struct InclusionFilter {
    direction: IncludeIncomingOutgoing,
    edges: IncludeEdgeType,
    include_entities: bool,
    /// Escaped group names, comparable with `KeyHeader::group`.
    entity_groups: HashSet<Vec<u8>>,
    edge_groups: HashSet<Vec<u8>>,
    /// Encoded seed identifiers for within-set lookups.
    within: Option<HashSet<Vec<u8>>>,
}

impl InclusionFilter {
    /// Accept every group of `view`, entities included, edges in any direction.
    pub fn from_view(view: &View) -> Self {
        Self {
            direction: IncludeIncomingOutgoing::Both,
            edges: IncludeEdgeType::All,
            include_entities: true,
            entity_groups: view.entities.iter().map(|g| escape::escape(g.as_bytes())).collect(),
            edge_groups: view.edges.iter().map(|g| escape::escape(g.as_bytes())).collect(),
            within: None,
        }
    }

    pub fn direction(mut self, direction: IncludeIncomingOutgoing) -> Self {
        self.direction = direction;
        self
    }

    pub fn edges(mut self, edges: IncludeEdgeType) -> Self {
        self.edges = edges;
        self
    }

    pub fn include_entities(mut self, include: bool) -> Self {
        self.include_entities = include;
        self
    }

    /// Restrict results to elements whose vertices are all in `encoded_seeds`.
    ///
    /// An edge between two members is kept from one of its two rows only.
    pub fn within(mut self, encoded_seeds: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.within = Some(encoded_seeds.into_iter().collect());
        self
    }

    fn in_set(&self, vertex: &[u8]) -> bool {
        self.within.as_ref().is_none_or(|set| set.contains(vertex))
    }

    /// The kinds of key a vertex lookup has to scan for this filter.
    pub fn key_space(&self) -> KeySpace {
        let any_edges = !self.edge_groups.is_empty();
        let directed = any_edges && self.edges.wants_directed();
        KeySpace {
            entities: self.include_entities && !self.entity_groups.is_empty(),
            outgoing: directed && self.direction.wants_outgoing(),
            incoming: directed && self.direction.wants_incoming(),
            undirected: any_edges && self.edges.wants_undirected(),
        }
    }

    pub fn accepts(&self, header: &KeyHeader<'_>) -> bool {
        match header.kind {
            KeyKind::Entity => {
                self.include_entities && self.entity_groups.contains(header.group) && self.in_set(header.vertex)
            }
            kind => {
                if !self.edge_groups.contains(header.group) {
                    return false;
                }
                let wanted = match kind {
                    KeyKind::Undirected => self.edges.wants_undirected(),
                    KeyKind::Outgoing | KeyKind::Incoming if header.is_self_loop() => self.edges.wants_directed(),
                    KeyKind::Outgoing => self.edges.wants_directed() && self.direction.wants_outgoing(),
                    _ => self.edges.wants_directed() && self.direction.wants_incoming(),
                };
                wanted && self.accepts_within(header)
            }
        }
    }

    fn accepts_within(&self, header: &KeyHeader<'_>) -> bool {
        let Some(set) = &self.within else {
            return true;
        };
        let Some(other) = header.other else {
            return false;
        };
        if !set.contains(header.vertex) || !set.contains(other) {
            return false;
        }
        match header.kind {
            // Also read from the source's row.
            KeyKind::Incoming => self.direction != IncludeIncomingOutgoing::Both || header.is_self_loop(),
            KeyKind::Undirected => header.vertex <= other,
            _ => true,
        }
    }
}

// ============================================================================
// Store-side filtering
// ============================================================================

/// Runs an [`InclusionFilter`] inside the store.
///
/// Entries whose key cannot be parsed are passed through so the reader
/// reports them.
#[derive(Debug)]
pub struct FilterScanIterator {
    filter: Arc<InclusionFilter>,
    package: Arc<dyn KeyPackage>,
}

impl FilterScanIterator {
    pub fn new(filter: Arc<InclusionFilter>, package: Arc<dyn KeyPackage>) -> Self {
        Self { filter, package }
    }
}

impl ScanIterator for FilterScanIterator {
    fn name(&self) -> &str {
        "inclusion-filter"
    }

    fn wrap(self: Arc<Self>, input: RawStream) -> RawStream {
        Box::new(input.filter(move |entry| match entry {
            Ok((key, _)) => self.package.header(key).map_or(true, |h| self.filter.accepts(&h)),
            Err(_) => true,
        }))
    }
}
