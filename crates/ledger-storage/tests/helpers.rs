#![allow(dead_code)]

use ledger_core::{now_millis, BlockSkeleton, ChainConfig, ChainStore, Ledger, Transaction};
use serde_json::json;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

pub fn create_temp_dir() -> (TempDir, std::path::PathBuf) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (temp_dir, db_path)
}

/// Difficulty 0 so any nonce seals a block.
pub fn easy_config() -> ChainConfig {
    ChainConfig::default().with_difficulty(0)
}

pub fn tx(i: usize) -> Transaction {
    Transaction {
        timestamp: 1_600_000_000_000 + i as i64,
        data: json!({ "seq": i }),
    }
}

pub fn skeleton(txs: Vec<Transaction>) -> BlockSkeleton {
    BlockSkeleton {
        timestamp: now_millis() - 1_000,
        transactions: txs,
        difficulty: 0,
        nonce: 0,
    }
}

/// Append `blocks` blocks of up to five transactions each through a ledger.
pub fn fill<S: ChainStore>(store: Arc<S>, blocks: usize) -> anyhow::Result<Ledger<S>> {
    let mut ledger = Ledger::open(store, &easy_config())?;
    for b in 0..blocks {
        let txs = (0..b % 6).map(|i| tx(b * 10 + i)).collect();
        ledger.append(&skeleton(txs))?;
    }
    Ok(ledger)
}
