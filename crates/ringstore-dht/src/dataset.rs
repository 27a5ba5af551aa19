//! Dataset sources.
//!
//! Loading a dataset is I/O that lives outside the ring protocol. The ring
//! only needs "give me the records for this key"; the peer binary plugs in
//! a CSV reader and tests plug in [`MemoryDatasets`].

use std::collections::HashMap;

use crate::{Dataset, DatasetError, Result};

/// Something that can produce the full dataset for a key.
pub trait DatasetSource: Send + Sync {
    /// Load every record of the dataset named by `key`.
    fn load(&self, key: &str) -> Result<Dataset>;
}

/// In-memory datasets, keyed by dataset key.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatasets {
    datasets: HashMap<String, Dataset>,
}

impl MemoryDatasets {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under its own key.
    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.key().to_string(), dataset);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, dataset: Dataset) -> Self {
        self.insert(dataset);
        self
    }
}

impl DatasetSource for MemoryDatasets {
    fn load(&self, key: &str) -> Result<Dataset> {
        self.datasets
            .get(key)
            .cloned()
            .ok_or_else(|| DatasetError::NotFound(key.to_string()))
    }
}
