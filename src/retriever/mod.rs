//! # Retriever
//!
//! Runs a retrieval request against the store and hands back a lazy
//! [`ElementStream`].
//!
//! ## Pipeline
//!
//! ```text
//! lookup ──RangeBuilder──▶ byte ranges ──coalesce──▶ one scan per range
//!                                                          │
//!        store side (if supported): FilterScanIterator ─▶ AggregatingScanIterator
//!                                                          │
//!        client side: header filter ─▶ decode ─▶ merge consecutive shards
//! ```
//!
//! Where filtering and summarisation run is fixed when the retriever is
//! built, from the store's capabilities and the `StoreConfig`. Requests are
//! validated completely before the first scan opens; after that, the first
//! store or decode failure ends the stream.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::aggregation::{AggregatingScanIterator, AggregationSettingsBuilder, AggregationStrategy, MergePlan};
use crate::config::StoreConfig;
use crate::filter::{FilterScanIterator, InclusionFilter};
use crate::key::{self, ByteRange, KeyPackage};
use crate::model::Element;
use crate::operation::GetOptions;
use crate::range::{Lookup, RangeBuilder};
use crate::schema::View;
use crate::storage::{KeyValue, ScanConfig, SortedStore};
use crate::{Error, Result};

/// Everything one retrieval needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub lookup: Lookup,
    pub view: View,
    pub options: GetOptions,
    /// Keep only elements whose vertices are all seeds of the lookup.
    pub within_set: bool,
}

/// Builds element streams over one store and key package.
#[derive(Debug)]
pub struct Retriever<S: SortedStore> {
    store: Arc<S>,
    package: Arc<dyn KeyPackage>,
    strategy: AggregationStrategy,
    filter_pushdown: bool,
}

impl<S: SortedStore> Retriever<S> {
    pub fn new(store: Arc<S>, package: Arc<dyn KeyPackage>, config: &StoreConfig) -> Self {
        let capabilities = store.capabilities();
        Self {
            strategy: AggregationStrategy::select(&capabilities, config.aggregation),
            filter_pushdown: config.filter_pushdown && capabilities.supports_scan_iterators,
            store,
            package,
        }
    }

    pub fn strategy(&self) -> AggregationStrategy {
        self.strategy
    }

    pub fn filter_pushdown(&self) -> bool {
        self.filter_pushdown
    }

    fn filter(&self, request: &RetrievalRequest) -> Result<InclusionFilter> {
        let filter = InclusionFilter::from_view(&request.view)
            .direction(request.options.include_incoming_outgoing)
            .edges(request.options.include_edges)
            .include_entities(request.options.include_entities);
        match (&request.lookup, request.within_set) {
            (Lookup::Seeds(seeds), true) => {
                let encoded = seeds
                    .iter()
                    .map(|seed| key::encode_seed(self.package.codec(), seed))
                    .collect::<Result<Vec<_>>>()?;
                Ok(filter.within(encoded))
            }
            (Lookup::Ranges(_), true) => Err(Error::InvalidRange("within-set lookups take seeds, not ranges".into())),
            _ => Ok(filter),
        }
    }

    /// Validate `request` and set up a stream over its results.
    ///
    /// No scan is opened until the stream is first pulled.
    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<ElementStream<S>> {
        let schema = self.package.codec().schema();
        let settings = AggregationSettingsBuilder::new(schema).build(&request.view, request.options.summarise)?;
        if request.view.is_empty() || request.lookup.is_empty() {
            debug!("nothing to retrieve");
            return Ok(ElementStream::new(self, VecDeque::new(), ScanConfig::new(), None, None));
        }

        let filter = self.filter(request)?;
        let ranges = RangeBuilder::new(self.package.as_ref()).build(&request.lookup, filter.key_space())?;
        let ranges: VecDeque<ByteRange> = ByteRange::coalesce(ranges).into();

        let filter = Arc::new(filter);
        let mut scan = ScanConfig::new();
        let post_filter = if self.filter_pushdown {
            scan = scan.with_iterator(Arc::new(FilterScanIterator::new(filter, Arc::clone(&self.package))));
            None
        } else {
            Some(filter)
        };
        let client_merge = match (settings.plan(), self.strategy) {
            (Some(plan), AggregationStrategy::StoreSide) => {
                scan = scan.with_iterator(Arc::new(AggregatingScanIterator::new(
                    Arc::clone(&self.package),
                    Arc::clone(plan),
                )));
                None
            }
            (Some(plan), AggregationStrategy::ClientSide) => Some(Arc::clone(plan)),
            (None, _) => None,
        };

        debug!(
            ranges = ranges.len(),
            iterators = scan.iterators.len(),
            client_filter = post_filter.is_some(),
            client_merge = client_merge.is_some(),
            "prepared retrieval"
        );
        Ok(ElementStream::new(self, ranges, scan, post_filter, client_merge))
    }
}

// ============================================================================
// ElementStream
// ============================================================================

/// Lazy, forward-only stream of retrieved elements.
///
/// Holds at most one open store cursor. The cursor is released when the
/// stream is exhausted, fails, is closed or is dropped; after that the stream
/// yields nothing.
pub struct ElementStream<S: SortedStore> {
    store: Arc<S>,
    package: Arc<dyn KeyPackage>,
    ranges: VecDeque<ByteRange>,
    scan: ScanConfig,
    cursor: Option<S::Cursor>,
    post_filter: Option<Arc<InclusionFilter>>,
    merge: Option<Arc<MergePlan>>,
    /// Logical prefix and running merge of the current client-side group.
    pending: Option<(Vec<u8>, Element)>,
    closed: bool,
}

impl<S: SortedStore> ElementStream<S> {
    fn new(
        retriever: &Retriever<S>,
        ranges: VecDeque<ByteRange>,
        scan: ScanConfig,
        post_filter: Option<Arc<InclusionFilter>>,
        merge: Option<Arc<MergePlan>>,
    ) -> Self {
        Self {
            store: Arc::clone(&retriever.store),
            package: Arc::clone(&retriever.package),
            ranges,
            scan,
            cursor: None,
            post_filter,
            merge,
            pending: None,
            closed: false,
        }
    }

    /// Release the scan. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cursor = None;
        self.ranges.clear();
        self.pending = None;
        trace!("element stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next raw entry, opening the next range's cursor when the current one
    /// runs dry.
    fn next_entry(&mut self) -> Option<Result<KeyValue>> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                match cursor.next() {
                    Some(Ok(entry)) => return Some(Ok(entry)),
                    Some(Err(e)) => return Some(Err(Error::RetrievalFailed(e))),
                    None => self.cursor = None,
                }
            }
            let range = self.ranges.pop_front()?;
            trace!(start = ?range.start, end = ?range.end, "opening scan");
            match self.store.scan(&range, &self.scan) {
                Ok(cursor) => self.cursor = Some(cursor),
                Err(e) => return Some(Err(Error::RetrievalFailed(e))),
            }
        }
    }

    /// Decode an entry the filter keeps, with the length of its logical prefix.
    fn accept(&self, key: &[u8], value: &[u8]) -> Result<Option<(usize, Element)>> {
        let header = self.package.header(key)?;
        if let Some(filter) = &self.post_filter {
            if !filter.accepts(&header) {
                return Ok(None);
            }
        }
        let element = key::decode_with_header(self.package.codec(), &header, value)?;
        Ok(Some((header.prefix_len, element)))
    }

    fn fail(&mut self, e: Error) -> Option<Result<Element>> {
        match &e {
            Error::CorruptKey(reason) => error!(%reason, "corrupt key, aborting retrieval"),
            other => error!(error = %other, "retrieval failed"),
        }
        self.close();
        Some(Err(e))
    }
}

impl<S: SortedStore> Iterator for ElementStream<S> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        loop {
            let (mut key, value) = match self.next_entry() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => return self.fail(e),
                None => {
                    let last = self.pending.take().map(|(_, element)| Ok(element));
                    self.close();
                    return last;
                }
            };
            let (prefix_len, element) = match self.accept(&key, &value) {
                Ok(Some(accepted)) => accepted,
                Ok(None) => continue,
                Err(e) => return self.fail(e),
            };

            let Some(plan) = &self.merge else {
                return Some(Ok(element));
            };
            key.truncate(prefix_len);
            match self.pending.take() {
                Some((prefix, mut acc)) if prefix == key => {
                    plan.merge_into(&mut acc, element);
                    self.pending = Some((prefix, acc));
                }
                Some((_, done)) => {
                    self.pending = Some((key, element));
                    return Some(Ok(done));
                }
                None => self.pending = Some((key, element)),
            }
        }
    }
}

impl<S: SortedStore> Drop for ElementStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationMode;
    use crate::key::KeyPackageKind;
    use crate::model::{Edge, ElementSeed, Entity, SeedRange, Value};
    use crate::schema::{AggregateFunction, GroupDefinition, PropertyDefinition, PropertyType, Schema};
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(PropertyType::String)
                .with_entity("N", GroupDefinition::new())
                .with_edge(
                    "E",
                    GroupDefinition::new().with_property(
                        "cq",
                        PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum).group_by(),
                    ),
                ),
        )
    }

    fn setup(store: MemoryStore, config: &StoreConfig) -> Retriever<MemoryStore> {
        let package = config.key_package.build(schema());
        let mut batch = Vec::new();
        for v in ["a", "b", "c"] {
            batch.extend(package.encode_element(&Entity::new("N", v).into()).unwrap());
            for cq in [1, 3, 5] {
                let edge = Edge::new("E", v, "z", true).with_property("cq", cq);
                batch.extend(package.encode_element(&edge.into()).unwrap());
            }
        }
        store.write(batch).unwrap();
        Retriever::new(Arc::new(store), package, config)
    }

    fn request(lookup: Lookup, options: GetOptions) -> RetrievalRequest {
        RetrievalRequest {
            lookup,
            view: View::new().entity("N").edge("E"),
            options,
            within_set: false,
        }
    }

    fn configs() -> Vec<(MemoryStore, StoreConfig)> {
        let mut out = Vec::new();
        for kind in [KeyPackageKind::ByteEntity, KeyPackageKind::Classic] {
            out.push((MemoryStore::new().with_batch_size(2), StoreConfig::new(kind)));
            out.push((
                MemoryStore::new(),
                StoreConfig::new(kind).aggregation(AggregationMode::Client).filter_pushdown(false),
            ));
            out.push((MemoryStore::new().without_scan_iterators(), StoreConfig::new(kind)));
        }
        out
    }

    #[test]
    fn test_summarised_and_raw_counts_agree_across_strategies() {
        for (store, config) in configs() {
            let retriever = setup(store, &config);
            let range = Lookup::Ranges(vec![SeedRange::new("a", "c")]);

            let raw: Vec<Element> = retriever
                .retrieve(&request(range.clone(), GetOptions::default().summarise(false)))
                .unwrap()
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(raw.len(), 3 + 9, "{config:?}");

            let merged: Vec<Element> = retriever
                .retrieve(&request(range, GetOptions::default()))
                .unwrap()
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(merged.len(), 3 + 3, "{config:?}");
            for edge in merged.iter().filter(|e| e.is_edge()) {
                assert_eq!(edge.property("cq"), Some(&Value::Int(9)));
            }
        }
    }

    #[test]
    fn test_strategy_follows_capabilities() {
        let retriever = setup(MemoryStore::new().without_scan_iterators(), &StoreConfig::default());
        assert_eq!(retriever.strategy(), AggregationStrategy::ClientSide);
        assert!(!retriever.filter_pushdown());

        let retriever = setup(MemoryStore::new(), &StoreConfig::default());
        assert_eq!(retriever.strategy(), AggregationStrategy::StoreSide);
        assert!(retriever.filter_pushdown());
    }

    #[test]
    fn test_empty_view_opens_no_scan() {
        let store = MemoryStore::new();
        let retriever = setup(store.clone(), &StoreConfig::default());
        let mut req = request(Lookup::Ranges(vec![SeedRange::new("a", "z")]), GetOptions::default());
        req.view = View::new();
        let mut stream = retriever.retrieve(&req).unwrap();
        assert!(stream.next().is_none());
        assert_eq!(store.scans_started(), 0);
    }

    #[test]
    fn test_no_scan_before_first_pull() {
        let store = MemoryStore::new();
        let retriever = setup(store.clone(), &StoreConfig::default());
        let stream = retriever
            .retrieve(&request(Lookup::Seeds(vec![ElementSeed::new("a")]), GetOptions::default()))
            .unwrap();
        assert_eq!(store.scans_started(), 0);
        drop(stream);
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn test_close_releases_cursor() {
        let store = MemoryStore::new().with_batch_size(1);
        let retriever = setup(store.clone(), &StoreConfig::default());
        let mut stream = retriever
            .retrieve(&request(Lookup::Ranges(vec![SeedRange::new("a", "c")]), GetOptions::default()))
            .unwrap();
        assert!(stream.next().is_some());
        assert_eq!(store.open_cursors(), 1);
        stream.close();
        assert_eq!(store.open_cursors(), 0);
        assert!(stream.is_closed());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_within_set_rejects_ranges() {
        let retriever = setup(MemoryStore::new(), &StoreConfig::default());
        let mut req = request(Lookup::Ranges(vec![SeedRange::new("a", "b")]), GetOptions::default());
        req.within_set = true;
        assert!(matches!(retriever.retrieve(&req), Err(Error::InvalidRange(_))));
    }
}
