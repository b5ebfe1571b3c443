//! Ledger blocks.
//!
//! A block hash is
//! `sha256(block_id || timestamp || previous_hash_hex || merkle_root_hex || nonce)`
//! with the integers rendered in decimal. The Merkle root is a single level:
//! `sha256` over the concatenated hex signatures of the included transactions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use veritrail_core::Sha256Digest;

use crate::types::{BlockId, TxId};

/// The fields a proof-of-work search commits to, apart from the nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_id: BlockId,
    pub timestamp: i64,
    pub previous_hash: Sha256Digest,
    pub merkle_root: Sha256Digest,
}

impl BlockHeader {
    /// The nonce-independent prefix of the hash input.
    pub fn hash_prefix(&self) -> String {
        format!(
            "{}{}{}{}",
            self.block_id,
            self.timestamp,
            self.previous_hash.to_hex(),
            self.merkle_root.to_hex()
        )
    }

    /// Hash this header with the given nonce.
    pub fn hash_with_nonce(&self, nonce: u64) -> Sha256Digest {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_prefix().as_bytes());
        hasher.update(nonce.to_string().as_bytes());
        Sha256Digest::from_bytes(hasher.finalize().into())
    }
}

/// A sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBlock {
    pub block_id: BlockId,
    /// Position in the chain; genesis is 0.
    pub height: u64,
    /// Seal time (Unix ms).
    pub timestamp: i64,
    pub previous_hash: Sha256Digest,
    pub merkle_root: Sha256Digest,
    /// Included transactions, in seal order.
    pub transaction_ids: Vec<TxId>,
    pub nonce: u64,
    /// Leading zero nibbles the hash was mined to.
    pub difficulty: u8,
    pub hash: Sha256Digest,
}

impl LedgerBlock {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            block_id: self.block_id.clone(),
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
        }
    }

    /// Recompute the hash from the other fields.
    pub fn compute_hash(&self) -> Sha256Digest {
        self.header().hash_with_nonce(self.nonce)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

/// Merkle root over transaction signatures, in the given order.
///
/// An empty list hashes the empty string.
pub fn merkle_root<'a>(signatures: impl IntoIterator<Item = &'a Sha256Digest>) -> Sha256Digest {
    let mut hasher = Sha256::new();
    for sig in signatures {
        hasher.update(sig.to_hex().as_bytes());
    }
    Sha256Digest::from_bytes(hasher.finalize().into())
}
