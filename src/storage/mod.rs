//! # Sorted Store Trait
//!
//! This is THE contract between graphkv and any sorted key-value store.
//! Everything the key packages and the retriever need from storage is
//! defined here.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory BTreeMap for testing/embedding |
//!
//! ## Scan iterators
//!
//! A store that reports `supports_scan_iterators` runs the `ScanIterator`s of
//! a `ScanConfig` next to the data, in the order given, before entries reach
//! the cursor. That is where the retriever pushes filtering and
//! summarisation. Stores without the capability must reject a non-empty
//! `ScanConfig` instead of silently ignoring it.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::key::ByteRange;

pub use memory::MemoryStore;

/// One stored entry.
pub type KeyValue = (Vec<u8>, Vec<u8>);

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Entries flowing out of a scan, possibly through scan iterators.
pub type RawStream = Box<dyn Iterator<Item = StoreResult<KeyValue>> + Send>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("scan failed: {0}")]
    Scan(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("scan iterator '{name}' failed: {message}")]
    Iterator { name: String, message: String },

    #[error("not supported by this store: {0}")]
    Unsupported(String),
}

// ============================================================================
// Store capabilities
// ============================================================================

/// What a store can do. Used by the retriever to pick its strategies.
///
/// All fields default to false / empty. Stores override via `capabilities()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub supports_scan_iterators: bool,
    /// Most entries one `write` call accepts. `None` is unbounded.
    pub max_batch_size: Option<usize>,
}

// ============================================================================
// Scan iterators
// ============================================================================

/// A transformation applied by the store to the entries of one scan.
pub trait ScanIterator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Wrap the entries of a scan.
    fn wrap(self: Arc<Self>, input: RawStream) -> RawStream;
}

/// Per-scan settings.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub iterators: Vec<Arc<dyn ScanIterator>>,
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterator(mut self, iterator: Arc<dyn ScanIterator>) -> Self {
        self.iterators.push(iterator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.iterators.is_empty()
    }

    /// Run the configured iterators over `input`, first one innermost.
    pub fn apply(&self, input: RawStream) -> RawStream {
        self.iterators
            .iter()
            .fold(input, |stream, iterator| Arc::clone(iterator).wrap(stream))
    }
}

// ============================================================================
// SortedStore Trait
// ============================================================================

/// The sorted key-value store contract.
///
/// Keys are compared as unsigned bytes. Writing a key that already exists
/// replaces its value.
pub trait SortedStore: Send + Sync + 'static {
    /// Forward-only cursor over one scan. Dropping it releases the scan.
    type Cursor: Iterator<Item = StoreResult<KeyValue>> + Send;

    /// Scan `range` in ascending key order.
    fn scan(&self, range: &ByteRange, config: &ScanConfig) -> StoreResult<Self::Cursor>;

    fn write(&self, batch: Vec<KeyValue>) -> StoreResult<()>;

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}
