//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::key::KeyPackageKind;
use crate::storage::memory::DEFAULT_BATCH_SIZE;
use crate::{Error, Result};

/// Where summarisation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Inside the store when it supports scan iterators, otherwise in the client.
    #[default]
    Auto,
    /// Always in the client.
    Client,
}

/// Options fixed when a graph is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub key_package: KeyPackageKind,
    pub aggregation: AggregationMode,
    /// Run the inclusion filter inside the store when it can.
    pub filter_pushdown: bool,
    /// Entries per batch for the in-memory store's cursors.
    pub scan_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_package: KeyPackageKind::default(),
            aggregation: AggregationMode::default(),
            filter_pushdown: true,
            scan_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn new(key_package: KeyPackageKind) -> Self {
        Self { key_package, ..Self::default() }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: StoreConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid store config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(Error::Config("scan_batch_size must be positive".into()));
        }
        Ok(())
    }

    pub fn aggregation(mut self, mode: AggregationMode) -> Self {
        self.aggregation = mode;
        self
    }

    pub fn filter_pushdown(mut self, enabled: bool) -> Self {
        self.filter_pushdown = enabled;
        self
    }

    pub fn scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }
}
