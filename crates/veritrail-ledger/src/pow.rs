//! Proof-of-work search.
//!
//! The search is CPU-bound and synchronous; callers run it on a blocking
//! worker. It polls a [`CancelFlag`] every `check_interval` nonces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use veritrail_core::Sha256Digest;

use crate::block::BlockHeader;
use crate::error::{LedgerError, Result};

/// Largest meaningful difficulty: every nibble of a SHA-256 digest.
pub const MAX_DIFFICULTY: u8 = 64;

/// Shared cancellation signal for a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Whether `hash` has at least `difficulty` leading zero hex nibbles.
pub fn meets_difficulty(hash: &Sha256Digest, difficulty: u8) -> bool {
    hash.leading_zero_nibbles() >= u32::from(difficulty)
}

/// Search nonces from 0 upward until the header hash meets `difficulty`.
///
/// Returns the winning nonce and hash, or `Cancelled` once `cancel` is set.
pub fn mine(
    header: &BlockHeader,
    difficulty: u8,
    cancel: &CancelFlag,
    check_interval: u64,
) -> Result<(u64, Sha256Digest)> {
    if difficulty > MAX_DIFFICULTY {
        return Err(LedgerError::InvalidDifficulty(difficulty));
    }
    let check_interval = check_interval.max(1);

    let mut base = Sha256::new();
    base.update(header.hash_prefix().as_bytes());

    let mut nonce: u64 = 0;
    loop {
        if nonce % check_interval == 0 && cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let mut hasher = base.clone();
        hasher.update(nonce.to_string().as_bytes());
        let hash = Sha256Digest::from_bytes(hasher.finalize().into());
        if meets_difficulty(&hash, difficulty) {
            return Ok((nonce, hash));
        }

        nonce = nonce
            .checked_add(1)
            .ok_or_else(|| LedgerError::Backend("nonce space exhausted".into()))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockId;

    fn header() -> BlockHeader {
        BlockHeader {
            block_id: BlockId::from_height(1),
            timestamp: 1_700_000_000_000,
            previous_hash: Sha256Digest::hash(b"prev"),
            merkle_root: Sha256Digest::hash(b"root"),
        }
    }

    #[test]
    fn test_mined_hash_meets_difficulty_and_recomputes() {
        let header = header();
        let (nonce, hash) = mine(&header, 3, &CancelFlag::new(), 1024).unwrap();
        assert!(hash.leading_zero_nibbles() >= 3);
        assert!(hash.to_hex().starts_with("000"));
        assert_eq!(header.hash_with_nonce(nonce), hash);
    }

    #[test]
    fn test_zero_difficulty_takes_first_nonce() {
        let (nonce, _) = mine(&header(), 0, &CancelFlag::new(), 1).unwrap();
        assert_eq!(nonce, 0);
    }

    #[test]
    fn test_cancelled_search_stops() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        // Unreachable difficulty; only cancellation can end the search.
        let result = mine(&header(), 64, &cancel, 16);
        assert!(matches!(result, Err(LedgerError::Cancelled)));
    }

    #[test]
    fn test_difficulty_out_of_range() {
        let result = mine(&header(), 65, &CancelFlag::new(), 16);
        assert!(matches!(result, Err(LedgerError::InvalidDifficulty(65))));
    }
}
