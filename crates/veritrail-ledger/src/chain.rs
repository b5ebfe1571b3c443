//! Whole-chain validation.
//!
//! Checks, for every block in order:
//! 1. Genesis has height 0 and the all-zero previous hash
//! 2. Each later block links to the hash of the one before it
//! 3. The stored hash equals the recomputed hash and meets its difficulty
//! 4. The Merkle root matches the signatures of the listed transactions

use std::collections::{HashMap, HashSet};

use veritrail_core::Sha256Digest;

use crate::block::{merkle_root, LedgerBlock};
use crate::error::{LedgerError, Result};
use crate::pow::meets_difficulty;
use crate::transaction::LedgerTransaction;
use crate::types::TxId;

fn corrupted(index: usize, reason: impl Into<String>) -> LedgerError {
    LedgerError::ChainCorrupted {
        index,
        reason: reason.into(),
    }
}

/// Validate a chain against the transactions it references.
///
/// An empty chain is invalid: every ledger starts from a genesis block.
pub fn validate_blocks(
    blocks: &[LedgerBlock],
    transactions: &HashMap<TxId, LedgerTransaction>,
) -> Result<()> {
    if blocks.is_empty() {
        return Err(corrupted(0, "missing genesis block"));
    }

    let mut sealed: HashSet<&TxId> = HashSet::new();

    for (index, block) in blocks.iter().enumerate() {
        if block.height != index as u64 {
            return Err(corrupted(index, format!("height {} out of place", block.height)));
        }

        let expected_prev = if index == 0 {
            Sha256Digest::ZERO
        } else {
            blocks[index - 1].hash
        };
        if block.previous_hash != expected_prev {
            return Err(corrupted(index, "previous hash does not link"));
        }

        if block.compute_hash() != block.hash {
            return Err(corrupted(index, "hash does not match contents"));
        }
        if !meets_difficulty(&block.hash, block.difficulty) {
            return Err(corrupted(index, "hash does not meet difficulty"));
        }

        let mut signatures = Vec::with_capacity(block.transaction_ids.len());
        for tx_id in &block.transaction_ids {
            let tx = transactions
                .get(tx_id)
                .ok_or_else(|| corrupted(index, format!("unknown transaction {}", tx_id)))?;
            if !tx.signature_valid() {
                return Err(corrupted(index, format!("bad signature on {}", tx_id)));
            }
            if !sealed.insert(tx_id) {
                return Err(corrupted(index, format!("transaction {} sealed twice", tx_id)));
            }
            signatures.push(tx.signature);
        }
        if merkle_root(&signatures) != block.merkle_root {
            return Err(corrupted(index, "merkle root does not match transactions"));
        }
    }

    Ok(())
}
