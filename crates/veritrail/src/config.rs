//! Engine configuration.
//!
//! Plain structs with defaults. Hosts load them however they like; every
//! field is optional when deserializing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use veritrail_core::DEFAULT_CHUNK_SIZE;
use veritrail_ledger::LedgerConfig;

/// Configuration for the Engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Configuration for the local ledger, when one is built from this config.
    pub ledger: LedgerConfig,
    /// Actor recorded on audit events the engine writes itself.
    pub actor: String,
    /// Upper bound on `ancestors` / `descendants` depth, whatever the caller asks.
    pub max_traversal_depth: usize,
    /// Read size when hashing streams and files.
    pub stream_chunk_size: usize,
    /// Deadline for store lookups, verification, and sealing.
    pub operation_timeout: Option<Duration>,
    /// Merge new metadata keys into an existing artifact on a dedup hit.
    pub merge_metadata_on_dedup: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            actor: "system".to_string(),
            max_traversal_depth: 32,
            stream_chunk_size: DEFAULT_CHUNK_SIZE,
            operation_timeout: None,
            merge_metadata_on_dedup: true,
        }
    }
}

impl EngineConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn with_difficulty(mut self, difficulty: u8) -> Self {
        self.ledger.difficulty = difficulty;
        self
    }
}
