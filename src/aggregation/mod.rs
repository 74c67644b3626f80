//! # Aggregation
//!
//! Summarisation merges every stored shard of one logical element (same key
//! up to the qualifier) into a single element, property by property, with the
//! aggregator the schema declares for it.
//!
//! [`AggregationSettingsBuilder`] resolves those aggregators once per query.
//! Where the merge happens is an [`AggregationStrategy`] picked when the
//! retriever is built:
//!
//! | Strategy | Runs in | How |
//! |----------|---------|-----|
//! | `StoreSide` | the store | [`AggregatingScanIterator`] merges and re-encodes each group |
//! | `ClientSide` | the stream | consecutive decoded elements are folded with [`MergePlan::merge_into`] |
//!
//! Keys of one logical element are contiguous in a scan, so both only ever
//! look at neighbouring entries.

use std::collections::{BTreeMap, VecDeque};
use std::iter::Fuse;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use crate::codec::merge;
use crate::config::AggregationMode;
use crate::key::KeyPackage;
use crate::model::{Element, Value};
use crate::schema::{AggregateFunction, GroupDefinition, GroupKind, Schema, View};
use crate::storage::{KeyValue, RawStream, ScanIterator, StoreCapabilities, StoreError, StoreResult};
use crate::Result;

// ============================================================================
// Settings
// ============================================================================

type Aggregators = BTreeMap<String, AggregateFunction>;

/// Aggregators for every group of a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    entities: HashMap<String, Aggregators>,
    edges: HashMap<String, Aggregators>,
}

impl MergePlan {
    fn aggregators(def: &GroupDefinition) -> Aggregators {
        def.properties.iter().map(|(name, d)| (name.clone(), d.aggregator)).collect()
    }

    /// Aggregator for one property. Undeclared properties keep their first value.
    pub fn function(&self, kind: GroupKind, group: &str, property: &str) -> AggregateFunction {
        let groups = match kind {
            GroupKind::Entity => &self.entities,
            GroupKind::Edge => &self.edges,
        };
        groups
            .get(group)
            .and_then(|props| props.get(property))
            .copied()
            .unwrap_or_default()
    }

    /// Fold the properties of `incoming` into `existing`.
    ///
    /// Both must be shards of the same logical element; `existing` came first.
    pub fn merge_into(&self, existing: &mut Element, incoming: Element) {
        let kind = match existing {
            Element::Entity(_) => GroupKind::Entity,
            Element::Edge(_) => GroupKind::Edge,
        };
        let group = existing.group().to_owned();
        let incoming = match incoming {
            Element::Entity(e) => e.properties,
            Element::Edge(e) => e.properties,
        };
        let target = existing.properties_mut();
        for (name, value) in incoming {
            let function = self.function(kind, &group, &name);
            let current = target.remove(&name).unwrap_or(Value::Null);
            target.insert(name, merge(current, value, function));
        }
    }
}

/// What a query asks of summarisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationSettings {
    /// Every physical shard is returned separately.
    Disabled,
    Merge(Arc<MergePlan>),
}

impl AggregationSettings {
    pub fn plan(&self) -> Option<&Arc<MergePlan>> {
        match self {
            AggregationSettings::Merge(plan) => Some(plan),
            AggregationSettings::Disabled => None,
        }
    }
}

/// Resolves [`AggregationSettings`] from the schema.
#[derive(Debug, Clone, Copy)]
pub struct AggregationSettingsBuilder<'s> {
    schema: &'s Schema,
}

impl<'s> AggregationSettingsBuilder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Fails with `Error::Schema` when the view names a group the schema lacks.
    pub fn build(&self, view: &View, summarise: bool) -> Result<AggregationSettings> {
        view.validate(self.schema)?;
        if !summarise {
            return Ok(AggregationSettings::Disabled);
        }
        let mut plan = MergePlan::default();
        for group in &view.entities {
            let def = self.schema.group(GroupKind::Entity, group)?;
            plan.entities.insert(group.clone(), MergePlan::aggregators(def));
        }
        for group in &view.edges {
            let def = self.schema.group(GroupKind::Edge, group)?;
            plan.edges.insert(group.clone(), MergePlan::aggregators(def));
        }
        Ok(AggregationSettings::Merge(Arc::new(plan)))
    }
}

// ============================================================================
// Strategy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationStrategy {
    StoreSide,
    ClientSide,
}

impl AggregationStrategy {
    pub fn select(capabilities: &StoreCapabilities, mode: AggregationMode) -> Self {
        let strategy = match mode {
            AggregationMode::Auto if capabilities.supports_scan_iterators => AggregationStrategy::StoreSide,
            _ => AggregationStrategy::ClientSide,
        };
        debug!(?mode, ?strategy, "selected aggregation strategy");
        strategy
    }
}

// ============================================================================
// Store-side aggregation
// ============================================================================

/// Merges groups of entries sharing a logical prefix inside the store.
///
/// An entry whose key cannot be parsed ends the current group and is passed
/// through unchanged. So is every entry of a group with a member that fails
/// to decode: the reader decodes them again and reports the corrupt entry
/// itself.
#[derive(Debug)]
pub struct AggregatingScanIterator {
    package: Arc<dyn KeyPackage>,
    plan: Arc<MergePlan>,
}

impl AggregatingScanIterator {
    pub const NAME: &'static str = "aggregation";

    pub fn new(package: Arc<dyn KeyPackage>, plan: Arc<MergePlan>) -> Self {
        Self { package, plan }
    }

    fn failure(message: impl ToString) -> StoreError {
        StoreError::Iterator {
            name: Self::NAME.into(),
            message: message.to_string(),
        }
    }

    /// Merge one group, or hand it back untouched when a member won't decode.
    fn merge_group(&self, prefix: &[u8], group: Vec<KeyValue>) -> StoreResult<Merged> {
        let decoded: Result<Vec<Element>> = group.iter().map(|(key, value)| self.package.decode(key, value)).collect();
        let elements = match decoded {
            Ok(elements) => elements,
            Err(e) => {
                debug!(error = %e, entries = group.len(), "undecodable group passed through");
                return Ok(Merged::PassThrough(group));
            }
        };
        let mut merged: Option<Element> = None;
        for element in elements {
            match merged.as_mut() {
                Some(acc) => self.plan.merge_into(acc, element),
                None => merged = Some(element),
            }
        }
        let merged = merged.ok_or_else(|| Self::failure("empty group"))?;
        let encoded = self.package.encode_element(&merged).map_err(Self::failure)?;
        encoded
            .into_iter()
            .find(|(key, _)| self.package.logical_prefix(key).is_ok_and(|p| p == prefix))
            .map(Merged::One)
            .ok_or_else(|| Self::failure("merged element no longer encodes to its row"))
    }
}

enum Merged {
    One(KeyValue),
    PassThrough(Vec<KeyValue>),
}

impl ScanIterator for AggregatingScanIterator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn wrap(self: Arc<Self>, input: RawStream) -> RawStream {
        Box::new(AggregatingStream {
            input: input.fuse(),
            lookahead: None,
            passthrough: VecDeque::new(),
            iterator: self,
        })
    }
}

struct AggregatingStream {
    input: Fuse<RawStream>,
    lookahead: Option<StoreResult<KeyValue>>,
    passthrough: VecDeque<KeyValue>,
    iterator: Arc<AggregatingScanIterator>,
}

impl Iterator for AggregatingStream {
    type Item = StoreResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.passthrough.pop_front() {
            return Some(Ok(entry));
        }
        let (key, value) = match self.lookahead.take().or_else(|| self.input.next())? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        let prefix = match self.iterator.package.logical_prefix(&key) {
            Ok(prefix) => prefix.to_vec(),
            Err(_) => return Some(Ok((key, value))),
        };

        let mut group = vec![(key, value)];
        loop {
            match self.input.next() {
                Some(Ok((k, v)))
                    if self.iterator.package.logical_prefix(&k).is_ok_and(|p| p == prefix.as_slice()) =>
                {
                    group.push((k, v));
                }
                other => {
                    self.lookahead = other;
                    break;
                }
            }
        }

        if group.len() == 1 {
            return group.pop().map(Ok);
        }
        match self.iterator.merge_group(&prefix, group) {
            Ok(Merged::One(entry)) => Some(Ok(entry)),
            Ok(Merged::PassThrough(group)) => {
                self.passthrough = group.into();
                self.passthrough.pop_front().map(Ok)
            }
            Err(e) => Some(Err(e)),
        }
    }
}
