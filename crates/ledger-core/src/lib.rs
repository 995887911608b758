use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub mod activity;
pub mod chain;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod mine;
pub mod pool;

pub use activity::{ActivityLog, TracingActivityLog};
pub use chain::{ChainStore, Ledger, MemoryStore};
pub use client::Client;
pub use config::{ChainConfig, RecoveryMode};
pub use error::{LedgerError, Result};
pub use mine::{MinerState, MiningEngine, MiningEvent};
pub use pool::TransactionPool;

/// Lowercase hex SHA-256 digest.
pub type Hash = String;

/// Wall clock in Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub data: Value,
}

/// Raw transaction as submitted by a caller, before validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default)]
    pub data: Value,
}

impl TransactionRequest {
    pub fn new(timestamp: impl Into<Value>, data: impl Into<Value>) -> Self {
        Self {
            timestamp: timestamp.into(),
            data: data.into(),
        }
    }

    /// A request stamped with the current time.
    pub fn now(data: impl Into<Value>) -> Self {
        Self::new(now_millis(), data)
    }
}

impl TryFrom<TransactionRequest> for Transaction {
    type Error = LedgerError;

    fn try_from(request: TransactionRequest) -> Result<Self> {
        let timestamp = parse_timestamp(&request.timestamp)
            .ok_or_else(|| LedgerError::validation("invalid timestamp"))?;
        if is_empty_payload(&request.data) {
            return Err(LedgerError::validation("data field not present"));
        }
        Ok(Transaction {
            timestamp,
            data: request.data,
        })
    }
}

/// Resolve a submitted timestamp to Unix milliseconds.
///
/// Accepts integer milliseconds (as a number or a string of digits), RFC 3339
/// and RFC 2822 strings. Returns `None` for anything else or for instants
/// outside the representable calendar range.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    let millis = match value {
        Value::Number(n) => match n.as_i64() {
            Some(ms) => ms,
            None => {
                let f = n.as_f64().filter(|f| f.is_finite())?;
                f.trunc() as i64
            }
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(ms) => ms,
                Err(_) => DateTime::parse_from_rfc3339(s)
                    .or_else(|_| DateTime::parse_from_rfc2822(s))
                    .ok()?
                    .timestamp_millis(),
            }
        }
        _ => return None,
    };
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.timestamp_millis())
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// A committed block. Field order is the canonical serialization order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub difficulty: usize,
    pub nonce: u64,
    pub previous_hash: Hash,
    pub hash: Hash,
}

impl Block {
    /// Everything but the hash, borrowed.
    pub fn content(&self) -> BlockContent<'_> {
        BlockContent {
            number: self.number,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            difficulty: self.difficulty,
            nonce: self.nonce,
            previous_hash: &self.previous_hash,
        }
    }

    pub fn compute_hash(&self) -> Result<Hash> {
        self.content().hash()
    }
}

/// The hashed part of a block: the block without its `hash` field.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContent<'a> {
    pub number: u64,
    pub timestamp: i64,
    pub transactions: &'a [Transaction],
    pub difficulty: usize,
    pub nonce: u64,
    pub previous_hash: &'a str,
}

impl BlockContent<'_> {
    pub fn hash(&self) -> Result<Hash> {
        compute_hash(self)
    }
}

/// What the mining engine hands to [`Ledger::append`]; the ledger fills in
/// number, linkage and hash.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockSkeleton {
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub difficulty: usize,
    pub nonce: u64,
}

/// SHA-256 over the compact JSON serialization of `value`.
pub fn compute_hash<T: Serialize + ?Sized>(value: &T) -> Result<Hash> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub mod pow {
    use super::{BlockContent, Hash, Result};

    /// True when `hash` starts with `difficulty` `'0'` characters.
    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Try up to `attempts` nonces starting at `candidate.nonce`.
    ///
    /// On success `candidate.nonce` holds the winning nonce and its hash is
    /// returned. On failure `candidate.nonce` is the next nonce to try.
    pub fn search(candidate: &mut BlockContent<'_>, attempts: u64) -> Result<Option<Hash>> {
        for _ in 0..attempts {
            let hash = candidate.hash()?;
            if meets_difficulty(&hash, candidate.difficulty) {
                return Ok(Some(hash));
            }
            candidate.nonce = candidate.nonce.wrapping_add(1);
        }
        Ok(None)
    }
}
