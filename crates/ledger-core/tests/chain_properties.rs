use ledger_core::chain::verify_chain;
use ledger_core::constants::GENESIS_PREVIOUS_HASH;
use ledger_core::{pow, ChainConfig, Client, MemoryStore, TracingActivityLog, TransactionRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn config(difficulty: usize) -> ChainConfig {
    ChainConfig {
        difficulty,
        tick_ms: 0,
        attempts_per_tick: 32,
        ..ChainConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submissions_interleaved_with_mining_keep_every_invariant() -> anyhow::Result<()> {
    let client = Arc::new(Client::open(
        "props",
        MemoryStore::new(),
        config(1),
        Arc::new(TracingActivityLog),
    )?);
    client.mine(true);

    let total = 120;
    let submitter = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            for i in 0..total {
                client
                    .submit_transaction(TransactionRequest::now(json!({ "seq": i })))
                    .unwrap();
                if i % 7 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        })
    };
    submitter.await?;

    tokio::time::timeout(Duration::from_secs(30), async {
        while !client.pending_transactions().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    client.mine(false);

    let blocks = client.get_all_blocks()?;
    verify_chain(&blocks)?;

    // sequential numbering and linkage
    assert_eq!(blocks.len() as u64, client.get_block_number());
    assert_eq!(blocks[0].previous_hash, GENESIS_PREVIOUS_HASH);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.number, i as u64 + 1);
        assert!(pow::meets_difficulty(&block.hash, block.difficulty));
        assert!(block.transactions.len() <= 5);
    }
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].compute_hash()?);
    }

    // FIFO: concatenated transactions reproduce admission order exactly once
    let seqs: Vec<i64> = blocks
        .iter()
        .flat_map(|b| b.transactions.iter())
        .map(|t| t.data["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (0..total as i64).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn stop_before_any_find_leaves_height_unchanged() -> anyhow::Result<()> {
    let client = Client::open(
        "idle",
        MemoryStore::new(),
        config(6),
        Arc::new(TracingActivityLog),
    )?;
    client.submit_transaction(TransactionRequest::now("x"))?;
    client.mine(true);
    client.mine(false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.get_block_number(), 0);
    assert_eq!(client.pending_transactions().len(), 1);
    Ok(())
}
