//! Error types for the Engine.

use std::time::Duration;

use thiserror::Error;
use veritrail_core::CoreError;
use veritrail_ledger::LedgerError;
use veritrail_store::StoreError;

/// Errors that can occur during Engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced artifact, transaction, or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger chain failed validation. Never retried.
    #[error("chain corrupted at block {index}: {reason}")]
    ChainCorruption { index: usize, reason: String },

    /// The operation did not finish within the configured timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// I/O error while reading presented content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Errors caused by the request itself (400/404-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::NotFound(_))
    }

    /// Errors after which the ledger refuses further appends.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ChainCorruption { .. })
    }

    /// Errors that may succeed if the same call is made again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout(_)
                | EngineError::Store(StoreError::Backend(_))
                | EngineError::Ledger(LedgerError::Backend(_))
                | EngineError::Ledger(LedgerError::Cancelled)
        )
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Io(io) => EngineError::Io(io),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Store(other),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ChainCorrupted { index, reason } => {
                EngineError::ChainCorruption { index, reason }
            }
            LedgerError::UnknownTransaction(tx) => {
                EngineError::NotFound(format!("transaction {}", tx))
            }
            LedgerError::EmptySeal | LedgerError::AlreadySealed(_) => {
                EngineError::Validation(e.to_string())
            }
            LedgerError::Core(core) => core.into(),
            other => EngineError::Ledger(other),
        }
    }
}

/// Result type for Engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
