//! Adapter for an external ledger service.
//!
//! The service is reached through a [`LedgerClient`], whose failures are
//! untyped (`anyhow`). [`ExternalLedger`] computes payload digests locally,
//! forwards them, and wraps every client failure in [`LedgerError::Backend`].
//!
//! Once the service reports an invalid chain the adapter stops forwarding
//! writes; `submit` and `seal` fail with [`LedgerError::ChainCorrupted`] for
//! the rest of its lifetime.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use veritrail_core::{hash_record, now_millis, Sha256Digest};

use crate::backend::{LedgerBackend, ProofBundle, SealReceipt};
use crate::error::{LedgerError, Result};
use crate::types::{BlockId, TxId};

/// What an external service reports for a seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSeal {
    pub block_id: String,
    /// Hex block hash, if the service exposes one.
    pub block_hash: Option<String>,
}

/// Client for a remote ledger service.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Register a transaction and return the service's id for it.
    async fn submit_transaction(
        &self,
        operation: &str,
        payload_digest: &Sha256Digest,
    ) -> anyhow::Result<String>;

    /// Seal the given transactions.
    async fn seal_transactions(&self, tx_ids: &[String]) -> anyhow::Result<ExternalSeal>;

    /// Whether the service considers its chain intact.
    async fn chain_is_valid(&self) -> anyhow::Result<bool>;

    /// Proof for a sealed transaction, if the service can produce one.
    async fn fetch_proof(&self, tx_id: &str) -> anyhow::Result<Option<ProofBundle>>;
}

fn backend_error(context: &str, e: anyhow::Error) -> LedgerError {
    LedgerError::Backend(format!("{}: {:#}", context, e))
}

/// [`LedgerBackend`] over a [`LedgerClient`].
pub struct ExternalLedger<C> {
    client: C,
    corrupted: AtomicBool,
}

const CORRUPTION_REASON: &str = "external ledger reported an invalid chain";

impl<C: LedgerClient> ExternalLedger<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            corrupted: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Whether the service has ever reported an invalid chain.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Acquire)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_corrupted() {
            // The service gives no block index.
            return Err(LedgerError::ChainCorrupted {
                index: 0,
                reason: CORRUPTION_REASON.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<C: LedgerClient> LedgerBackend for ExternalLedger<C> {
    fn kind(&self) -> &'static str {
        "external"
    }

    async fn submit(&self, operation: &str, payload: &Value) -> Result<TxId> {
        self.ensure_writable()?;
        let payload_digest = hash_record(payload)?;
        let tx_id = self
            .client
            .submit_transaction(operation, &payload_digest)
            .await
            .map_err(|e| backend_error("submit failed", e))?;
        debug!(tx_id = %tx_id, operation, "submitted external transaction");
        Ok(TxId(tx_id))
    }

    async fn seal(&self, tx_ids: &[TxId]) -> Result<SealReceipt> {
        if tx_ids.is_empty() {
            return Err(LedgerError::EmptySeal);
        }
        self.ensure_writable()?;
        let ids: Vec<String> = tx_ids.iter().map(|id| id.0.clone()).collect();
        let seal = self
            .client
            .seal_transactions(&ids)
            .await
            .map_err(|e| backend_error("seal failed", e))?;

        let block_hash = seal
            .block_hash
            .as_deref()
            .map(Sha256Digest::from_hex)
            .transpose()
            .map_err(|e| LedgerError::Backend(format!("service returned bad block hash: {}", e)))?;

        Ok(SealReceipt {
            block_id: BlockId(seal.block_id),
            block_hash,
            sealed_at: now_millis(),
            tx_ids: tx_ids.to_vec(),
        })
    }

    async fn validate_chain(&self) -> Result<bool> {
        let valid = self
            .client
            .chain_is_valid()
            .await
            .map_err(|e| backend_error("chain check failed", e))?;
        if !valid && !self.corrupted.swap(true, Ordering::AcqRel) {
            error!("{}; refusing appends", CORRUPTION_REASON);
        }
        Ok(valid && !self.is_corrupted())
    }

    async fn proof(&self, tx_id: &TxId) -> Result<Option<ProofBundle>> {
        self.client
            .fetch_proof(tx_id.as_str())
            .await
            .map_err(|e| backend_error("proof lookup failed", e))
    }
}
