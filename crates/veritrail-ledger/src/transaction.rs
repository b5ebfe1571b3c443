//! Ledger transactions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use veritrail_core::Sha256Digest;

use crate::types::TxId;

/// A submitted operation. Immutable once created.
///
/// The payload itself is not kept, only its canonical digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_id: TxId,
    pub operation: String,
    pub payload_digest: Sha256Digest,
    /// `sha256(tx_id || operation || payload_digest_hex)`.
    pub signature: Sha256Digest,
    /// Submission time (Unix ms).
    pub submitted_at: i64,
}

impl LedgerTransaction {
    pub fn new(
        tx_id: TxId,
        operation: impl Into<String>,
        payload_digest: Sha256Digest,
        now: i64,
    ) -> Self {
        let operation = operation.into();
        let signature = compute_signature(&tx_id, &operation, &payload_digest);
        Self {
            tx_id,
            operation,
            payload_digest,
            signature,
            submitted_at: now,
        }
    }

    /// Check that `signature` matches the other fields.
    pub fn signature_valid(&self) -> bool {
        compute_signature(&self.tx_id, &self.operation, &self.payload_digest) == self.signature
    }
}

/// Derive a transaction signature.
pub fn compute_signature(tx_id: &TxId, operation: &str, payload_digest: &Sha256Digest) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(tx_id.as_str().as_bytes());
    hasher.update(operation.as_bytes());
    hasher.update(payload_digest.to_hex().as_bytes());
    Sha256Digest::from_bytes(hasher.finalize().into())
}
