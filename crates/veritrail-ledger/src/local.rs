//! Local hash-chain ledger.
//!
//! An in-process stand-in for an external distributed ledger. Blocks are
//! mined on a blocking worker and appended by a single writer. Once the
//! chain fails validation every further seal is refused.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use veritrail_core::{hash_record, now_millis, Sha256Digest};

use crate::backend::{LedgerBackend, ProofBundle, SealReceipt};
use crate::block::{merkle_root, BlockHeader, LedgerBlock};
use crate::chain::validate_blocks;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::pow::{mine, CancelFlag};
use crate::transaction::LedgerTransaction;
use crate::types::{BlockId, TxId};

/// In-process hash chain with proof-of-work sealing.
pub struct LocalLedger {
    config: LedgerConfig,
    state: RwLock<ChainState>,
    /// Serializes seals so each block is mined on the current head.
    writer: Mutex<()>,
}

#[derive(Default)]
struct ChainState {
    blocks: Vec<LedgerBlock>,
    transactions: HashMap<TxId, LedgerTransaction>,
    /// Submission order, for export.
    tx_order: Vec<TxId>,
    /// Height of the block holding each sealed transaction.
    sealed_in: HashMap<TxId, u64>,
    /// Set once validation fails.
    corruption: Option<(usize, String)>,
}

impl ChainState {
    fn ensure_writable(&self) -> Result<()> {
        match &self.corruption {
            Some((index, reason)) => Err(LedgerError::ChainCorrupted {
                index: *index,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn head(&self) -> Result<&LedgerBlock> {
        self.blocks
            .last()
            .ok_or_else(|| LedgerError::ChainCorrupted {
                index: 0,
                reason: "missing genesis block".into(),
            })
    }

    fn index_sealed(&mut self) {
        self.sealed_in.clear();
        for block in &self.blocks {
            for tx_id in &block.transaction_ids {
                self.sealed_in.insert(tx_id.clone(), block.height);
            }
        }
    }
}

/// Cancels a proof-of-work search if the sealing future is dropped mid-flight.
struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}

impl LocalLedger {
    /// Create a ledger and mine its genesis block.
    ///
    /// Mining runs on the calling thread; at the default difficulty this
    /// takes a few tens of milliseconds.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;

        let header = BlockHeader {
            block_id: BlockId::from_height(0),
            timestamp: now_millis(),
            previous_hash: Sha256Digest::ZERO,
            merkle_root: merkle_root([]),
        };
        let (nonce, hash) = mine(
            &header,
            config.difficulty,
            &CancelFlag::new(),
            config.cancel_check_interval,
        )?;

        let genesis = LedgerBlock {
            block_id: header.block_id,
            height: 0,
            timestamp: header.timestamp,
            previous_hash: header.previous_hash,
            merkle_root: header.merkle_root,
            transaction_ids: Vec::new(),
            nonce,
            difficulty: config.difficulty,
            hash,
        };
        info!(hash = %genesis.hash, difficulty = config.difficulty, "mined genesis block");

        let state = ChainState {
            blocks: vec![genesis],
            ..ChainState::default()
        };
        Ok(Self {
            config,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    /// Rebuild a ledger from exported blocks and transactions.
    ///
    /// The import is validated. A corrupt import still yields a ledger, but
    /// one that refuses all further seals.
    pub fn restore(
        config: LedgerConfig,
        blocks: Vec<LedgerBlock>,
        transactions: Vec<LedgerTransaction>,
    ) -> Result<Self> {
        config.validate()?;

        let mut state = ChainState {
            tx_order: transactions.iter().map(|tx| tx.tx_id.clone()).collect(),
            transactions: transactions
                .into_iter()
                .map(|tx| (tx.tx_id.clone(), tx))
                .collect(),
            blocks,
            ..ChainState::default()
        };

        match validate_blocks(&state.blocks, &state.transactions) {
            Ok(()) => state.index_sealed(),
            Err(LedgerError::ChainCorrupted { index, reason }) => {
                error!(index, reason = %reason, "restored chain failed validation");
                state.corruption = Some((index, reason));
            }
            Err(e) => return Err(e),
        }

        Ok(Self {
            config,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ChainState>> {
        self.state
            .read()
            .map_err(|e| LedgerError::Backend(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ChainState>> {
        self.state
            .write()
            .map_err(|e| LedgerError::Backend(format!("lock poisoned: {}", e)))
    }

    /// All blocks, genesis first.
    pub fn blocks(&self) -> Result<Vec<LedgerBlock>> {
        Ok(self.read()?.blocks.clone())
    }

    /// All transactions, in submission order.
    pub fn transactions(&self) -> Result<Vec<LedgerTransaction>> {
        let state = self.read()?;
        Ok(state
            .tx_order
            .iter()
            .filter_map(|id| state.transactions.get(id).cloned())
            .collect())
    }

    pub fn transaction(&self, tx_id: &TxId) -> Result<Option<LedgerTransaction>> {
        Ok(self.read()?.transactions.get(tx_id).cloned())
    }

    /// Submitted transactions not yet in a block, in submission order.
    pub fn pending(&self) -> Result<Vec<TxId>> {
        let state = self.read()?;
        Ok(state
            .tx_order
            .iter()
            .filter(|id| !state.sealed_in.contains_key(*id))
            .cloned()
            .collect())
    }

    /// The current head block.
    pub fn head(&self) -> Result<LedgerBlock> {
        Ok(self.read()?.head()?.clone())
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.blocks.len())
    }

    /// Whether appends are refused. A poisoned lock counts as corrupted.
    pub fn is_corrupted(&self) -> bool {
        self.read().map_or(true, |s| s.corruption.is_some())
    }

    /// Seal transactions, stopping early if `cancel` is set.
    ///
    /// Only a fully mined block is appended; a cancelled or dropped seal
    /// leaves the chain and the pending set untouched.
    pub async fn seal_with_cancel(
        &self,
        tx_ids: &[TxId],
        cancel: CancelFlag,
    ) -> Result<SealReceipt> {
        if tx_ids.is_empty() {
            return Err(LedgerError::EmptySeal);
        }

        let _writer = self.writer.lock().await;

        let header = {
            let state = self.read()?;
            state.ensure_writable()?;

            let mut signatures = Vec::with_capacity(tx_ids.len());
            for (i, tx_id) in tx_ids.iter().enumerate() {
                let tx = state
                    .transactions
                    .get(tx_id)
                    .ok_or_else(|| LedgerError::UnknownTransaction(tx_id.to_string()))?;
                if state.sealed_in.contains_key(tx_id) || tx_ids[..i].contains(tx_id) {
                    return Err(LedgerError::AlreadySealed(tx_id.to_string()));
                }
                signatures.push(tx.signature);
            }

            let head = state.head()?;
            BlockHeader {
                block_id: BlockId::from_height(head.height + 1),
                timestamp: now_millis(),
                previous_hash: head.hash,
                merkle_root: merkle_root(&signatures),
            }
        };

        let difficulty = self.config.difficulty;
        let interval = self.config.cancel_check_interval;
        let mut guard = CancelOnDrop {
            flag: cancel.clone(),
            armed: true,
        };

        debug!(block_id = %header.block_id, txs = tx_ids.len(), difficulty, "mining block");
        let search_header = header.clone();
        let mined = tokio::task::spawn_blocking(move || {
            mine(&search_header, difficulty, &cancel, interval)
        })
        .await
        .map_err(|e| LedgerError::Backend(format!("spawn_blocking failed: {}", e)))?;
        guard.armed = false;
        let (nonce, hash) = mined?;

        let height = header.block_id.as_str().parse::<u64>().map_err(|e| {
            LedgerError::Backend(format!("block id {} is not a height: {}", header.block_id, e))
        })?;
        let block = LedgerBlock {
            block_id: header.block_id,
            height,
            timestamp: header.timestamp,
            previous_hash: header.previous_hash,
            merkle_root: header.merkle_root,
            transaction_ids: tx_ids.to_vec(),
            nonce,
            difficulty,
            hash,
        };

        let receipt = SealReceipt {
            block_id: block.block_id.clone(),
            block_hash: Some(block.hash),
            sealed_at: block.timestamp,
            tx_ids: block.transaction_ids.clone(),
        };

        {
            let mut state = self.write()?;
            state.ensure_writable()?;
            for tx_id in &block.transaction_ids {
                state.sealed_in.insert(tx_id.clone(), height);
            }
            state.blocks.push(block);
        }

        info!(
            block_id = %receipt.block_id,
            nonce,
            hash = %hash,
            txs = receipt.tx_ids.len(),
            "appended block"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl LedgerBackend for LocalLedger {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn submit(&self, operation: &str, payload: &Value) -> Result<TxId> {
        let payload_digest = hash_record(payload)?;
        let tx = LedgerTransaction::new(TxId::generate(), operation, payload_digest, now_millis());
        let tx_id = tx.tx_id.clone();

        let mut state = self.write()?;
        state.tx_order.push(tx_id.clone());
        state.transactions.insert(tx_id.clone(), tx);
        debug!(tx_id = %tx_id, operation, "submitted transaction");
        Ok(tx_id)
    }

    async fn seal(&self, tx_ids: &[TxId]) -> Result<SealReceipt> {
        self.seal_with_cancel(tx_ids, CancelFlag::new()).await
    }

    async fn validate_chain(&self) -> Result<bool> {
        let mut state = self.write()?;
        match validate_blocks(&state.blocks, &state.transactions) {
            Ok(()) => Ok(state.corruption.is_none()),
            Err(LedgerError::ChainCorrupted { index, reason }) => {
                error!(index, reason = %reason, "chain failed validation; refusing appends");
                state.corruption = Some((index, reason));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn proof(&self, tx_id: &TxId) -> Result<Option<ProofBundle>> {
        let state = self.read()?;
        let Some(transaction) = state.transactions.get(tx_id) else {
            return Ok(None);
        };
        let Some(&height) = state.sealed_in.get(tx_id) else {
            return Ok(None);
        };
        let block = state
            .blocks
            .get(height as usize)
            .ok_or_else(|| LedgerError::Backend(format!("missing block {}", height)))?;

        let block_signatures = block
            .transaction_ids
            .iter()
            .map(|id| {
                state
                    .transactions
                    .get(id)
                    .map(|tx| tx.signature)
                    .ok_or_else(|| LedgerError::UnknownTransaction(id.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ProofBundle {
            transaction: transaction.clone(),
            block_id: block.block_id.clone(),
            block_timestamp: block.timestamp,
            previous_hash: block.previous_hash,
            merkle_root: block.merkle_root,
            block_signatures,
            nonce: block.nonce,
            difficulty: block.difficulty,
            block_hash: block.hash,
        }))
    }
}
