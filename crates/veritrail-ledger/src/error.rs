//! Error types for the ledger.

use thiserror::Error;
use veritrail_core::CoreError;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A seal named a transaction that was never submitted.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// A seal named a transaction that is already in a block.
    #[error("transaction already sealed: {0}")]
    AlreadySealed(String),

    /// A seal named no transactions.
    #[error("cannot seal an empty transaction list")]
    EmptySeal,

    /// The chain failed validation. Appends are refused from here on.
    #[error("chain corrupted at block {index}: {reason}")]
    ChainCorrupted { index: usize, reason: String },

    /// A proof-of-work search was cancelled before finding a nonce.
    #[error("proof-of-work search cancelled")]
    Cancelled,

    /// The configured difficulty is out of range.
    #[error("invalid difficulty {0}: must be at most 64 hex nibbles")]
    InvalidDifficulty(u8),

    /// Encoding or hashing error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Lock poisoning, a failed blocking task, or an external service failure.
    #[error("ledger backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    /// Check if this error means the chain can no longer be appended to.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::ChainCorrupted { .. })
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
