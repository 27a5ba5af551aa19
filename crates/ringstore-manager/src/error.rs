//! Error types for the manager.

use thiserror::Error;

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can stop the manager.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ringstore_protocols::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
