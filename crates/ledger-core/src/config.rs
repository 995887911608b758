use crate::constants::{
    DEFAULT_ATTEMPTS_PER_TICK, DEFAULT_DIFFICULTY, DEFAULT_TICK_MS, HASH_HEX_SIZE,
    MAX_TRANSACTIONS_PER_BLOCK,
};
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How much of the stored chain is checked when a ledger is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Only the trailing record is parsed and re-hashed.
    #[default]
    Fast,
    /// Every record is re-hashed and linkage is checked end to end.
    Full,
}

/// Consensus and scheduling knobs shared by the ledger and the mining engine.
///
/// `difficulty` lives here once so both components always agree on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Number of leading `'0'` hex characters a block hash must carry.
    pub difficulty: usize,
    /// Upper bound of transactions sealed into one block.
    pub batch_size: usize,
    /// Pause between search steps. Zero yields to the scheduler instead of sleeping.
    pub tick_ms: u64,
    /// Nonces tried per search step.
    pub attempts_per_tick: u64,
    pub recovery: RecoveryMode,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            batch_size: MAX_TRANSACTIONS_PER_BLOCK,
            tick_ms: DEFAULT_TICK_MS,
            attempts_per_tick: DEFAULT_ATTEMPTS_PER_TICK,
            recovery: RecoveryMode::Fast,
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > HASH_HEX_SIZE {
            return Err(LedgerError::validation(format!(
                "difficulty {} exceeds hash length {HASH_HEX_SIZE}",
                self.difficulty
            )));
        }
        if self.batch_size == 0 {
            return Err(LedgerError::validation("batch_size must be at least 1"));
        }
        if self.attempts_per_tick == 0 {
            return Err(LedgerError::validation(
                "attempts_per_tick must be at least 1",
            ));
        }
        Ok(())
    }
}
