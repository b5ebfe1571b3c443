//! Error types for Veritrail Core.

use thiserror::Error;

/// Errors raised by the pure core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record contains a value with no canonical representation.
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// A digest string is not exactly 64 hex characters.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// An identifier string could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Reading a stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
