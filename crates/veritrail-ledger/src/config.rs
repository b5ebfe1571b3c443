//! Ledger configuration.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::pow::MAX_DIFFICULTY;

/// Configuration for a local ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Required leading zero hex nibbles in every block hash.
    pub difficulty: u8,
    /// Nonces tried between cancellation checks.
    pub cancel_check_interval: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            cancel_check_interval: 4096,
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidDifficulty(self.difficulty));
        }
        Ok(())
    }
}
