//! Error types for psshard
//!
//! Every fallible operation in the workspace returns [`Result`]. Errors are
//! plain values surfaced to the immediate caller; nothing here is fatal to
//! the process and nothing is retried.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for psshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the parameter-shard engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Argument rejected before any mutation: dtype or shape mismatch,
    /// malformed handle tensor, bad configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Identity not present in the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dtype combination or array rank the engine does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration file could not be read, parsed or written
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a `NotFound` error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an `Unsupported` error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a `Config` error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for `InvalidArgument`
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for `Unsupported`
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }
}
