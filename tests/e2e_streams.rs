//! End-to-end integration tests for stream lifecycle, failures and ingestion.
//!
//! Covers cursor release on close/drop/error, concurrent retrievals on one
//! graph, corrupt keys, failing stores, key package markers and the
//! skip-and-report behaviour of AddElements.

use std::sync::Arc;

use graphkv::codec::escape;
use graphkv::key::ByteRange;
use graphkv::schema::{AggregateFunction, GroupDefinition, PropertyDefinition, PropertyType};
use graphkv::storage::{KeyValue, ScanConfig, StoreResult};
use graphkv::{
    AggregationMode, Edge, Element, Entity, Error, GetElementsInRanges, GetOptions, Graph, KeyPackage,
    KeyPackageKind, MemoryStore, Schema, SeedRange, SortedStore, StoreConfig, StoreError, Value, View,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Helpers
// ============================================================================

fn schema() -> Schema {
    Schema::new(PropertyType::String)
        .with_entity(
            "Cell",
            GroupDefinition::new()
                .with_property("count", PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum)),
        )
        .with_edge(
            "Link",
            GroupDefinition::new()
                .with_property("weight", PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum))
                .with_property(
                    "shard",
                    PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum).group_by(),
                ),
        )
}

fn populate(graph: &Graph<MemoryStore>, vertices: usize) {
    let mut elements: Vec<Element> = Vec::new();
    for i in 0..vertices {
        let v = format!("{i:04}");
        elements.push(Entity::new("Cell", v.as_str()).with_property("count", 1).into());
        for shard in [1, 2] {
            elements.push(
                Edge::new("Link", v.as_str(), "hub", true)
                    .with_property("shard", shard)
                    .with_property("weight", 1)
                    .into(),
            );
        }
    }
    graph.add_elements(elements).unwrap();
}

fn graph(kind: KeyPackageKind, batch: usize) -> Graph<MemoryStore> {
    let graph = Graph::open_memory_with(schema(), StoreConfig::new(kind).scan_batch_size(batch)).unwrap();
    populate(&graph, 100);
    graph
}

fn all_groups() -> View {
    View::new().entity("Cell").edge("Link")
}

fn whole_range() -> GetElementsInRanges {
    GetElementsInRanges::new(all_groups(), [SeedRange::new("0", "1")])
}

fn kinds() -> [KeyPackageKind; 2] {
    [KeyPackageKind::ByteEntity, KeyPackageKind::Classic]
}

// ============================================================================
// 1. Cursors are released on exhaustion, close and drop
// ============================================================================

#[test]
fn test_exhausted_stream_releases_cursor() {
    for kind in kinds() {
        let graph = graph(kind, 8);
        let mut stream = graph.get_elements_in_ranges(whole_range()).unwrap();
        let n = stream.by_ref().count();
        assert_eq!(n, 200, "{kind}");
        assert_eq!(graph.store().open_cursors(), 0);
        assert!(stream.is_closed());
        assert!(stream.next().is_none());
    }
}

#[test]
fn test_early_close_and_drop_release_cursor() {
    for kind in kinds() {
        let graph = graph(kind, 4);

        let mut closed = graph.get_elements_in_ranges(whole_range()).unwrap();
        let first: Vec<Element> = closed.by_ref().take(3).collect::<graphkv::Result<_>>().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(graph.store().open_cursors(), 1);
        closed.close();
        closed.close();
        assert_eq!(graph.store().open_cursors(), 0);
        assert!(closed.next().is_none());

        let mut dropped = graph.get_elements_in_ranges(whole_range()).unwrap();
        assert!(dropped.next().is_some());
        assert_eq!(graph.store().open_cursors(), 1);
        drop(dropped);
        assert_eq!(graph.store().open_cursors(), 0);
    }
}

// ============================================================================
// 2. Concurrent retrievals on one graph
// ============================================================================

#[test]
fn test_concurrent_retrievals() {
    for kind in kinds() {
        let graph = Arc::new(graph(kind, 16));
        let counts: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let graph = Arc::clone(&graph);
                    scope.spawn(move || {
                        let options = GetOptions::default().summarise(i % 2 == 0);
                        let op = whole_range().with_options(options);
                        graph.get_elements_in_ranges(op).unwrap().map(|r| r.unwrap()).count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (i, count) in counts.into_iter().enumerate() {
            let expected = if i % 2 == 0 { 200 } else { 300 };
            assert_eq!(count, expected, "{kind} thread {i}");
        }
        assert_eq!(graph.store().open_cursors(), 0);
    }
}

#[test]
fn test_concurrent_reads_and_writes() {
    let graph = Arc::new(graph(KeyPackageKind::ByteEntity, 4));
    std::thread::scope(|scope| {
        let writer = Arc::clone(&graph);
        scope.spawn(move || {
            for i in 100..200 {
                let v = format!("{i:04}");
                writer
                    .add_elements(vec![Entity::new("Cell", v.as_str()).with_property("count", 1).into()])
                    .unwrap();
            }
        });
        for _ in 0..4 {
            let reader = Arc::clone(&graph);
            scope.spawn(move || {
                let n = reader.get_elements_in_ranges(whole_range()).unwrap().map(|r| r.unwrap()).count();
                assert!((200..=300).contains(&n));
            });
        }
    });
    assert_eq!(graph.get_elements_in_ranges(whole_range()).unwrap().count(), 300);
}

// ============================================================================
// 3. A corrupt key aborts the stream
// ============================================================================

fn corruption_configs(kind: KeyPackageKind) -> [StoreConfig; 2] {
    [
        StoreConfig::new(kind),
        StoreConfig::new(kind).aggregation(AggregationMode::Client).filter_pushdown(false),
    ]
}

fn assert_aborts_with_corrupt_key(graph: &Graph<MemoryStore>, config: &StoreConfig) {
    let results: Vec<graphkv::Result<Element>> = graph.get_elements_in_ranges(whole_range()).unwrap().collect();
    let (last, before) = results.split_last().unwrap();
    assert!(matches!(last, Err(Error::CorruptKey(_))), "{config:?}: {last:?}");
    assert!(before.iter().all(|r| r.is_ok()), "{config:?}");
    assert!(before.len() < 20, "{config:?}");
    assert_eq!(graph.store().open_cursors(), 0);
}

#[test]
fn test_corrupt_key_aborts_stream() {
    for kind in kinds() {
        for config in corruption_configs(kind) {
            let graph = Graph::open_memory_with(schema(), config.clone().scan_batch_size(3)).unwrap();
            populate(&graph, 10);

            let mut junk = escape::encode_identifier(&Value::from("0005"), PropertyType::String).unwrap();
            junk.extend_from_slice(&[0x00, 0x09, 0x00, b'x']);
            graph.store().write(vec![(junk, Vec::new())]).unwrap();

            assert_aborts_with_corrupt_key(&graph, &config);
        }
    }
}

#[test]
fn test_corrupt_shard_value_aborts_stream() {
    for kind in kinds() {
        for config in corruption_configs(kind) {
            let graph = Graph::open_memory_with(schema(), config.clone().scan_batch_size(3)).unwrap();
            populate(&graph, 10);
            let third = Edge::new("Link", "0005", "hub", true)
                .with_property("shard", 3)
                .with_property("weight", 1)
                .into();
            graph.add_elements(vec![third]).unwrap();

            let middle = Edge::new("Link", "0005", "hub", true)
                .with_property("shard", 2)
                .with_property("weight", 1)
                .into();
            let keys = graph.key_package().encode_element(&middle).unwrap();
            graph.store().write(vec![(keys[0].0.clone(), vec![0xEE])]).unwrap();

            assert_aborts_with_corrupt_key(&graph, &config);
        }
    }
}

// ============================================================================
// 4. Failing stores
// ============================================================================

/// A store whose scans and writes fail once opened.
#[derive(Debug, Default)]
struct BrokenStore;

impl SortedStore for BrokenStore {
    type Cursor = std::vec::IntoIter<StoreResult<KeyValue>>;

    fn scan(&self, _range: &ByteRange, _config: &ScanConfig) -> StoreResult<Self::Cursor> {
        Err(StoreError::Scan("tablet server unreachable".into()))
    }

    fn write(&self, batch: Vec<KeyValue>) -> StoreResult<()> {
        if batch.iter().any(|(k, _)| k.as_slice() == graphkv::KEY_PACKAGE_METADATA_KEY) {
            return Ok(());
        }
        Err(StoreError::Write("read-only".into()))
    }

    fn get(&self, _key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[test]
fn test_scan_failure_surfaces_as_retrieval_failed() {
    let graph = Graph::open(BrokenStore, schema(), StoreConfig::default()).unwrap();
    let mut stream = graph.get_elements_in_ranges(whole_range()).unwrap();
    assert!(matches!(stream.next(), Some(Err(Error::RetrievalFailed(StoreError::Scan(_))))));
    assert!(stream.next().is_none());
}

#[test]
fn test_write_failure_surfaces_as_operation_failed() {
    let graph = Graph::open(BrokenStore, schema(), StoreConfig::default()).unwrap();
    let result = graph.add_elements(vec![Entity::new("Cell", "a").into()]);
    match result {
        Err(Error::OperationFailed { operation, source }) => {
            assert_eq!(operation, "AddElements");
            assert!(matches!(*source, Error::WriteFailed(StoreError::Write(_))));
        }
        other => panic!("expected OperationFailed, got {other:?}"),
    }
}

// ============================================================================
// 5. Key package marker
// ============================================================================

#[test]
fn test_reopen_keeps_data_and_rejects_other_package() {
    let store = MemoryStore::new();
    let first = Graph::open(store.clone(), schema(), StoreConfig::new(KeyPackageKind::Classic)).unwrap();
    populate(&first, 5);
    drop(first);

    let again = Graph::open(store.clone(), schema(), StoreConfig::new(KeyPackageKind::Classic)).unwrap();
    assert_eq!(again.get_elements_in_ranges(whole_range()).unwrap().count(), 10);

    let other = Graph::open(store, schema(), StoreConfig::new(KeyPackageKind::ByteEntity));
    assert!(matches!(other, Err(Error::Config(_))));
}

// ============================================================================
// 6. AddElements skips unsupported values and reports them
// ============================================================================

#[test]
fn test_add_elements_skips_unsupported_values() {
    for kind in kinds() {
        let graph = Graph::open_memory_with(schema(), StoreConfig::new(kind)).unwrap();
        let report = graph
            .add_elements(vec![
                Entity::new("Cell", "a").with_property("count", 1).into(),
                Entity::new("Cell", "b").with_property("count", "one").into(),
                Entity::new("Cell", 7).into(),
                Edge::new("Link", "a", "b", true).into(),
            ])
            .unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.keys_written, 3);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![1, 2]);
        assert!(report
            .skipped
            .iter()
            .all(|s| matches!(s.error, Error::UnsupportedValueType { .. })));

        let op = GetElementsInRanges::new(all_groups(), [SeedRange::new("a", "b")]);
        assert_eq!(graph.get_elements_in_ranges(op).unwrap().count(), 3, "{kind}");
    }
}

#[test]
fn test_add_elements_unknown_group_is_fatal() {
    let graph = Graph::open_memory(schema()).unwrap();
    let before = graph.store().len();
    let result = graph.add_elements(vec![
        Entity::new("Cell", "a").into(),
        Entity::new("Nope", "a").into(),
    ]);
    assert!(matches!(result, Err(Error::Schema(_))));
    assert_eq!(graph.store().len(), before);
}

#[test]
fn test_add_elements_respects_store_batch_limit() {
    for kind in kinds() {
        let store = MemoryStore::new().with_max_write_batch(3);
        let graph = Graph::open(store, schema(), StoreConfig::new(kind)).unwrap();
        let before = graph.store().len();
        populate(&graph, 5);
        assert_eq!(graph.store().len(), before + 5 + 5 * 2 * 2, "{kind}");
        assert_eq!(graph.get_elements_in_ranges(whole_range()).unwrap().count(), 10, "{kind}");
    }
}
