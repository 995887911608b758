use thiserror::Error;

/// Errors surfaced by the pool, the ledger and the mining engine.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed transaction or block-append request. Nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Block lookup outside `1..=current` (or `-1` on an empty ledger).
    #[error("block {0} not found")]
    NotFound(i64),

    /// Durable storage could not be read or written.
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    /// Stored records break hash linkage, numbering or difficulty.
    #[error("ledger integrity violation: {0}")]
    Integrity(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
