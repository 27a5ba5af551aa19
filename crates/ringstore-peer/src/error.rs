//! Error types for the peer.

use thiserror::Error;

/// Result type for peer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a peer.
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ringstore_protocols::Error),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(#[from] ringstore_dht::DatasetError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The manager answered FAILURE
    #[error("{0}")]
    Rejected(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The manager answered SUCCESS with the wrong payload
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A ring operation was abandoned before it completed
    #[error("Ring operation interrupted")]
    Interrupted,
}
