//! Common error types for expfuse

use thiserror::Error;

/// Common result type for expfuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the fusion workspace
#[derive(Error, Debug)]
pub enum Error {
    /// A public operation was invoked with an invalid precondition
    /// (empty candidate list, blank field name)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Every extraction source was null at record-fusion entry
    #[error("All extraction sources are missing")]
    AllSourcesMissing,

    /// Configuration loading or parse error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
