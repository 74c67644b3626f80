//! In-memory sorted store.
//!
//! This is the reference implementation of `SortedStore`.
//! It keeps every entry in one `BTreeMap` protected by a RwLock.
//!
//! ## Behaviour
//!
//! - **Batched cursors**: a cursor takes the read lock once per batch of
//!   `batch_size` entries and resumes after the last key it returned. Writes
//!   that land between batches are visible to the rest of the scan.
//! - **Scan iterators**: applied in-process on the scanning thread, unless the
//!   store was built with `without_scan_iterators()`, in which case it
//!   reports no support and rejects them.
//! - **Cursor accounting**: `open_cursors()` counts cursors not yet dropped.
//!
//! Use this store for:
//! - Testing key packages, the retriever and the operation handlers
//! - Embedding graphkv in applications that don't need persistence

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{KeyValue, RawStream, ScanConfig, SortedStore, StoreCapabilities, StoreError, StoreResult};
use crate::key::ByteRange;

/// Entries fetched per lock acquisition unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 256;

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory sorted key-value store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
    batch_size: usize,
    scan_iterators: bool,
    max_write_batch: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    open_cursors: AtomicUsize,
    scans: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner::default()),
            batch_size: DEFAULT_BATCH_SIZE,
            scan_iterators: true,
            max_write_batch: None,
        }
    }

    /// Entries fetched per batch (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Behave like a store that cannot run scan iterators.
    pub fn without_scan_iterators(mut self) -> Self {
        self.scan_iterators = false;
        self
    }

    /// Reject writes of more than `limit` entries (at least one).
    pub fn with_max_write_batch(mut self, limit: usize) -> Self {
        self.max_write_batch = Some(limit.max(1));
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Cursors handed out and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.inner.open_cursors.load(Ordering::Acquire)
    }

    /// Scans started since the store was created.
    pub fn scans_started(&self) -> u64 {
        self.inner.scans.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Reads one range in batches.
struct BatchScan {
    inner: Arc<MemoryInner>,
    next: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    batch_size: usize,
    buffer: VecDeque<KeyValue>,
    exhausted: bool,
}

impl BatchScan {
    fn new(inner: Arc<MemoryInner>, range: &ByteRange, batch_size: usize) -> Self {
        let end = if range.end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(range.end.clone())
        };
        Self {
            inner,
            next: Bound::Included(range.start.clone()),
            end,
            batch_size,
            buffer: VecDeque::with_capacity(batch_size),
            exhausted: range.is_empty(),
        }
    }

    fn fill(&mut self) {
        let entries = self.inner.entries.read();
        self.buffer.extend(
            entries
                .range((self.next.clone(), self.end.clone()))
                .take(self.batch_size)
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        drop(entries);

        match self.buffer.back() {
            Some((last, _)) if self.buffer.len() == self.batch_size => {
                self.next = Bound::Excluded(last.clone());
            }
            _ => self.exhausted = true,
        }
    }
}

impl Iterator for BatchScan {
    type Item = StoreResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Cursor returned by [`MemoryStore::scan`].
pub struct MemoryCursor {
    stream: RawStream,
    inner: Arc<MemoryInner>,
}

impl Iterator for MemoryCursor {
    type Item = StoreResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.inner.open_cursors.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// SortedStore impl
// ============================================================================

impl SortedStore for MemoryStore {
    type Cursor = MemoryCursor;

    fn scan(&self, range: &ByteRange, config: &ScanConfig) -> StoreResult<MemoryCursor> {
        if !self.scan_iterators && !config.is_empty() {
            return Err(StoreError::Unsupported("scan iterators".into()));
        }
        self.inner.scans.fetch_add(1, Ordering::Relaxed);
        self.inner.open_cursors.fetch_add(1, Ordering::AcqRel);

        let raw: RawStream = Box::new(BatchScan::new(Arc::clone(&self.inner), range, self.batch_size));
        Ok(MemoryCursor {
            stream: config.apply(raw),
            inner: Arc::clone(&self.inner),
        })
    }

    fn write(&self, batch: Vec<KeyValue>) -> StoreResult<()> {
        if let Some(limit) = self.max_write_batch.filter(|&limit| batch.len() > limit) {
            return Err(StoreError::Write(format!("batch of {} exceeds {limit} entries", batch.len())));
        }
        let mut entries = self.inner.entries.write();
        for (key, value) in batch {
            if key.is_empty() {
                return Err(StoreError::Write("empty key".into()));
            }
            entries.insert(key, value);
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.entries.read().get(key).cloned())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            supports_scan_iterators: self.scan_iterators,
            max_batch_size: self.max_write_batch,
        }
    }
}
