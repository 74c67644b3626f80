//! # graphkv: Property Graphs over Sorted Key-Value Stores
//!
//! Packs entities and edges into byte keys whose order matches graph-query
//! order, scans vertex ranges, and turns the entries back into elements with
//! query-time summarisation and direction filtering.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `KeyPackage` owns the byte layout, `SortedStore` owns
//!    the bytes; neither knows about the other's internals
//! 2. **Plain DTOs**: `Element`, `Entity`, `Edge`, `Value` cross all boundaries
//! 3. **Validate, then scan**: every request is checked before the first
//!    cursor opens
//! 4. **Pull-based**: results stream lazily and release their cursor on
//!    exhaustion, close or drop
//!
//! ## Quick Start
//!
//! ```rust
//! use graphkv::{Edge, GetElementsInRanges, Graph, Schema, SeedRange, View};
//! use graphkv::schema::{AggregateFunction, GroupDefinition, PropertyDefinition, PropertyType};
//!
//! # fn example() -> graphkv::Result<()> {
//! let schema = Schema::new(PropertyType::String).with_edge(
//!     "Knows",
//!     GroupDefinition::new()
//!         .with_property("count", PropertyDefinition::new(PropertyType::Int, AggregateFunction::Sum)),
//! );
//! let graph = Graph::open_memory(schema)?;
//! graph.add_elements(vec![Edge::new("Knows", "ada", "bob", true).with_property("count", 1).into()])?;
//!
//! let op = GetElementsInRanges::new(View::new().edge("Knows"), [SeedRange::new("a", "b")]);
//! for element in graph.get_elements_in_ranges(op)? {
//!     println!("{:?}", element?);
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Key Packages
//!
//! | Package | Config name | Direction lookups |
//! |---------|-------------|-------------------|
//! | Byte-entity | `byte_entity` (default) | outgoing/incoming/undirected scanned separately |
//! | Classic | `classic` | one edge range per vertex, filtered |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod codec;
pub mod key;
pub mod range;
pub mod filter;
pub mod aggregation;
pub mod retriever;
pub mod operation;
pub mod storage;
pub mod config;

use std::sync::Arc;

use tracing::info;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Edge, Element, ElementSeed, Entity, PropertyMap, SeedRange, Value};
pub use schema::{Schema, View};
pub use key::{KeyPackage, KeyPackageKind};
pub use filter::{IncludeEdgeType, IncludeIncomingOutgoing};
pub use retriever::{ElementStream, Retriever};
pub use operation::{
    AddElements, AddElementsHandler, AddReport, GetElementsInRanges, GetElementsInRangesHandler,
    GetElementsWithinSet, GetElementsWithinSetHandler, GetOptions, OperationHandler,
};
pub use storage::{MemoryStore, SortedStore, StoreCapabilities, StoreError};
pub use config::{AggregationMode, StoreConfig};

/// Reserved key recording which key package wrote a store.
///
/// `0xFF` is never the first byte of an encoded vertex identifier, so no
/// element key and no scan range built from seeds reaches it.
pub const KEY_PACKAGE_METADATA_KEY: &[u8] = b"\xff__key_package__";

// ============================================================================
// Top-level Graph handle
// ============================================================================

/// The primary entry point. A `Graph` binds a store to a schema and a key
/// package and runs operations against it.
///
/// `Graph` is `Send + Sync`; retrievals may run concurrently from many
/// threads, each stream owning its own cursor.
#[derive(Debug)]
pub struct Graph<S: SortedStore> {
    store: Arc<S>,
    package: Arc<dyn KeyPackage>,
    config: StoreConfig,
    retriever: Retriever<S>,
}

impl<S: SortedStore> Graph<S> {
    /// Open a graph over `store`.
    ///
    /// The first open records the configured key package in the store;
    /// reopening with a different one fails with `Error::Config`.
    pub fn open(store: S, schema: Schema, config: StoreConfig) -> Result<Self> {
        schema.validate()?;
        config.validate()?;
        Self::check_key_package(&store, config.key_package)?;

        let store = Arc::new(store);
        let package = config.key_package.build(Arc::new(schema));
        let retriever = Retriever::new(Arc::clone(&store), Arc::clone(&package), &config);
        info!(
            key_package = %config.key_package,
            aggregation = ?retriever.strategy(),
            filter_pushdown = retriever.filter_pushdown(),
            "opened graph"
        );
        Ok(Self { store, package, config, retriever })
    }

    fn check_key_package(store: &S, kind: KeyPackageKind) -> Result<()> {
        match store.get(KEY_PACKAGE_METADATA_KEY).map_err(Error::RetrievalFailed)? {
            Some(raw) => {
                let recorded = std::str::from_utf8(&raw)
                    .ok()
                    .and_then(KeyPackageKind::from_name)
                    .ok_or_else(|| Error::Config("unreadable key package marker".into()))?;
                if recorded != kind {
                    return Err(Error::Config(format!(
                        "store was written with the {recorded} key package, not {kind}"
                    )));
                }
                Ok(())
            }
            None => store
                .write(vec![(KEY_PACKAGE_METADATA_KEY.to_vec(), kind.name().as_bytes().to_vec())])
                .map_err(Error::WriteFailed),
        }
    }

    /// Run any operation through its handler.
    pub fn execute<H: OperationHandler<S>>(&self, handler: &H, operation: H::Operation) -> Result<H::Output> {
        handler.do_operation(operation, self)
    }

    pub fn add_elements(&self, elements: Vec<Element>) -> Result<AddReport> {
        self.execute(&AddElementsHandler, AddElements::new(elements))
    }

    pub fn get_elements_in_ranges(&self, operation: GetElementsInRanges) -> Result<ElementStream<S>> {
        self.execute(&GetElementsInRangesHandler, operation)
    }

    pub fn get_elements_within_set(&self, operation: GetElementsWithinSet) -> Result<ElementStream<S>> {
        self.execute(&GetElementsWithinSetHandler, operation)
    }

    pub fn schema(&self) -> &Schema {
        self.package.codec().schema()
    }

    pub fn key_package(&self) -> &dyn KeyPackage {
        self.package.as_ref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever<S> {
        &self.retriever
    }

    /// Access the underlying store (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }
}

/// In-memory graph for testing and embedding.
impl Graph<MemoryStore> {
    pub fn open_memory(schema: Schema) -> Result<Self> {
        Self::open_memory_with(schema, StoreConfig::default())
    }

    pub fn open_memory_with(schema: Schema, config: StoreConfig) -> Result<Self> {
        let store = MemoryStore::new().with_batch_size(config.scan_batch_size);
        Self::open(store, schema, config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported value type {value_type} for '{property}'")]
    UnsupportedValueType { property: String, value_type: &'static str },

    #[error("corrupt key: {0}")]
    CorruptKey(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("retrieval failed: {0}")]
    RetrievalFailed(#[source] StoreError),

    #[error("write failed: {0}")]
    WriteFailed(#[source] StoreError),

    #[error("{operation} failed: {source}")]
    OperationFailed {
        operation: &'static str,
        source: Box<Error>,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
