//! Error types for ringstore-dht.

use thiserror::Error;

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors raised while loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// No dataset is available under the requested key.
    #[error("dataset {0} not found")]
    NotFound(String),

    /// A row could not be turned into a record.
    #[error("malformed row {row}: {reason}")]
    Malformed { row: usize, reason: String },

    /// Underlying read failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
