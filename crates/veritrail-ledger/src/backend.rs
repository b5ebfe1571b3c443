//! The ledger backend interface.
//!
//! Callers seal through a [`LedgerBackend`] and cannot tell whether the
//! `(tx_id, block_id)` pair came from the local chain or an external service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use veritrail_core::Sha256Digest;

use crate::block::{merkle_root, BlockHeader};
use crate::error::Result;
use crate::pow::meets_difficulty;
use crate::transaction::LedgerTransaction;
use crate::types::{BlockId, TxId};

/// Outcome of a successful seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealReceipt {
    pub block_id: BlockId,
    /// Hash of the new block, when the backend reports one.
    pub block_hash: Option<Sha256Digest>,
    /// Seal time (Unix ms).
    pub sealed_at: i64,
    pub tx_ids: Vec<TxId>,
}

/// Everything a third party needs to recheck that a transaction was sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub transaction: LedgerTransaction,
    pub block_id: BlockId,
    pub block_timestamp: i64,
    pub previous_hash: Sha256Digest,
    pub merkle_root: Sha256Digest,
    /// Signatures of every transaction in the block, in seal order.
    pub block_signatures: Vec<Sha256Digest>,
    pub nonce: u64,
    pub difficulty: u8,
    pub block_hash: Sha256Digest,
}

impl ProofBundle {
    /// Recheck the bundle without access to the ledger.
    ///
    /// Verifies the transaction signature, its membership in the Merkle root,
    /// the block hash, and the proof of work.
    pub fn verify(&self) -> bool {
        if !self.transaction.signature_valid() {
            return false;
        }
        if !self.block_signatures.contains(&self.transaction.signature) {
            return false;
        }
        if merkle_root(&self.block_signatures) != self.merkle_root {
            return false;
        }
        let header = BlockHeader {
            block_id: self.block_id.clone(),
            timestamp: self.block_timestamp,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
        };
        header.hash_with_nonce(self.nonce) == self.block_hash
            && meets_difficulty(&self.block_hash, self.difficulty)
    }
}

/// A sealing backend, chosen at construction time.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Short name for logs, e.g. `"local"`.
    fn kind(&self) -> &'static str;

    /// Record a pending transaction over the canonical digest of `payload`.
    ///
    /// Does not touch the chain.
    async fn submit(&self, operation: &str, payload: &Value) -> Result<TxId>;

    /// Seal pending transactions into a new block at the head.
    async fn seal(&self, tx_ids: &[TxId]) -> Result<SealReceipt>;

    /// Recheck the whole chain. `false` means appends are now refused.
    async fn validate_chain(&self) -> Result<bool>;

    /// Proof that a transaction was sealed, or `None` if it is unknown or
    /// still pending.
    async fn proof(&self, tx_id: &TxId) -> Result<Option<ProofBundle>>;
}
