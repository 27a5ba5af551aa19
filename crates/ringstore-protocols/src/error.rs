//! Error types for ringstore-protocols.

use thiserror::Error;

/// Result type for ringstore-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding messages or driving the ring.
#[derive(Debug, Error)]
pub enum Error {
    /// The datagram carried no command.
    #[error("empty message")]
    Empty,

    /// The first token is not a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required token is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A token could not be parsed.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    /// A structured payload was not valid JSON for its type.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The ring node is in the wrong state for the requested operation.
    #[error("invalid ring state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    /// The dataset backing a seed could not be loaded.
    #[error("dataset error: {0}")]
    Dataset(#[from] ringstore_dht::DatasetError),
}
