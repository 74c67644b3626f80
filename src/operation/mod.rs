//! # Operations
//!
//! Immutable request objects and the handlers that run them against a
//! [`Graph`]. Handlers are thin: they translate an operation into a
//! retrieval request or a write batch.
//!
//! | Operation | Handler | Output |
//! |-----------|---------|--------|
//! | `GetElementsInRanges` | `GetElementsInRangesHandler` | `ElementStream` |
//! | `GetElementsWithinSet` | `GetElementsWithinSetHandler` | `ElementStream` |
//! | `AddElements` | `AddElementsHandler` | `AddReport` |

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filter::{IncludeEdgeType, IncludeIncomingOutgoing};
use crate::key::EncodedKeys;
use crate::model::{Element, ElementSeed, SeedRange};
use crate::range::Lookup;
use crate::retriever::{ElementStream, RetrievalRequest};
use crate::schema::View;
use crate::storage::SortedStore;
use crate::{Error, Graph, Result};

// ============================================================================
// Options
// ============================================================================

/// Result-shaping options shared by the get operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GetOptions {
    /// Merge the shards of each logical element.
    pub summarise: bool,
    pub include_incoming_outgoing: IncludeIncomingOutgoing,
    pub include_edges: IncludeEdgeType,
    pub include_entities: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            summarise: true,
            include_incoming_outgoing: IncludeIncomingOutgoing::Both,
            include_edges: IncludeEdgeType::All,
            include_entities: true,
        }
    }
}

impl GetOptions {
    pub fn summarise(mut self, summarise: bool) -> Self {
        self.summarise = summarise;
        self
    }

    pub fn include_incoming_outgoing(mut self, direction: IncludeIncomingOutgoing) -> Self {
        self.include_incoming_outgoing = direction;
        self
    }

    pub fn include_edges(mut self, edges: IncludeEdgeType) -> Self {
        self.include_edges = edges;
        self
    }

    pub fn include_entities(mut self, include: bool) -> Self {
        self.include_entities = include;
        self
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Every element stored under a row vertex inside any of the ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetElementsInRanges {
    pub ranges: Vec<SeedRange>,
    pub view: View,
    #[serde(default)]
    pub options: GetOptions,
}

impl GetElementsInRanges {
    pub fn new(view: View, ranges: impl IntoIterator<Item = SeedRange>) -> Self {
        Self {
            ranges: ranges.into_iter().collect(),
            view,
            options: GetOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GetOptions) -> Self {
        self.options = options;
        self
    }
}

/// Entities of the seeds and the edges running between two seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetElementsWithinSet {
    pub seeds: Vec<ElementSeed>,
    pub view: View,
    #[serde(default)]
    pub options: GetOptions,
}

impl GetElementsWithinSet {
    pub fn new(view: View, seeds: impl IntoIterator<Item = ElementSeed>) -> Self {
        Self {
            seeds: seeds.into_iter().collect(),
            view,
            options: GetOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GetOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddElements {
    pub elements: Vec<Element>,
}

impl AddElements {
    pub fn new(elements: impl IntoIterator<Item = Element>) -> Self {
        Self { elements: elements.into_iter().collect() }
    }
}

/// An element left out of a write.
#[derive(Debug)]
pub struct SkippedElement {
    /// Position in `AddElements::elements`.
    pub index: usize,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct AddReport {
    pub added: usize,
    pub keys_written: usize,
    pub skipped: Vec<SkippedElement>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Runs one kind of operation.
pub trait OperationHandler<S: SortedStore> {
    type Operation;
    type Output;

    fn do_operation(&self, operation: Self::Operation, graph: &Graph<S>) -> Result<Self::Output>;
}

/// Store failures while setting an operation up are reported against it.
fn setup_failure(operation: &'static str, error: Error) -> Error {
    match error {
        Error::RetrievalFailed(_) | Error::WriteFailed(_) => Error::OperationFailed {
            operation,
            source: Box::new(error),
        },
        other => other,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetElementsInRangesHandler;

impl<S: SortedStore> OperationHandler<S> for GetElementsInRangesHandler {
    type Operation = GetElementsInRanges;
    type Output = ElementStream<S>;

    fn do_operation(&self, operation: GetElementsInRanges, graph: &Graph<S>) -> Result<ElementStream<S>> {
        let request = RetrievalRequest {
            lookup: Lookup::Ranges(operation.ranges),
            view: operation.view,
            options: operation.options,
            within_set: false,
        };
        graph
            .retriever()
            .retrieve(&request)
            .map_err(|e| setup_failure("GetElementsInRanges", e))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetElementsWithinSetHandler;

impl<S: SortedStore> OperationHandler<S> for GetElementsWithinSetHandler {
    type Operation = GetElementsWithinSet;
    type Output = ElementStream<S>;

    fn do_operation(&self, operation: GetElementsWithinSet, graph: &Graph<S>) -> Result<ElementStream<S>> {
        let request = RetrievalRequest {
            lookup: Lookup::Seeds(operation.seeds),
            view: operation.view,
            options: operation.options,
            within_set: true,
        };
        graph
            .retriever()
            .retrieve(&request)
            .map_err(|e| setup_failure("GetElementsWithinSet", e))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddElementsHandler;

impl<S: SortedStore> OperationHandler<S> for AddElementsHandler {
    type Operation = AddElements;
    type Output = AddReport;

    /// Encodes every element, then writes the keys in batches no larger
    /// than the store accepts.
    ///
    /// Elements with a property value the schema cannot serialize are
    /// skipped and reported; any other failure aborts before anything is
    /// written.
    fn do_operation(&self, operation: AddElements, graph: &Graph<S>) -> Result<AddReport> {
        let package = graph.key_package();
        let mut report = AddReport::default();
        let mut batch = Vec::new();
        for (index, element) in operation.elements.iter().enumerate() {
            let keys: EncodedKeys = match package.encode_element(element) {
                Ok(keys) => keys,
                Err(error @ Error::UnsupportedValueType { .. }) => {
                    warn!(index, group = element.group(), %error, "skipping element");
                    report.skipped.push(SkippedElement { index, error });
                    continue;
                }
                Err(error) => return Err(error),
            };
            report.added += 1;
            report.keys_written += keys.len();
            batch.extend(keys);
        }
        let limit = graph.store().capabilities().max_batch_size.unwrap_or(usize::MAX).max(1);
        let mut writes = 0;
        while !batch.is_empty() {
            let rest = batch.split_off(batch.len().min(limit));
            graph
                .store()
                .write(batch)
                .map_err(|e| setup_failure("AddElements", Error::WriteFailed(e)))?;
            writes += 1;
            batch = rest;
        }
        debug!(
            added = report.added,
            keys = report.keys_written,
            skipped = report.skipped.len(),
            writes,
            "added elements"
        );
        Ok(report)
    }
}
