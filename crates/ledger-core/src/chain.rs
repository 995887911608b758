use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::pow::meets_difficulty;
use crate::{now_millis, Block, BlockSkeleton, ChainConfig, Hash, LedgerError, RecoveryMode, Result};
use anyhow::Context;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Durable backend the ledger appends to.
/// This lives in `ledger-core` so storage crates can implement it without a cycle.
pub trait ChainStore: Send + Sync {
    /// Durably append one record after the current last one.
    fn append(&self, block: &Block) -> anyhow::Result<()>;

    /// Every record, in commit order.
    fn read_all(&self) -> anyhow::Result<Vec<Block>>;

    fn read_last(&self) -> anyhow::Result<Option<Block>> {
        Ok(self.read_all()?.pop())
    }

    /// Positional lookup, 1-indexed.
    fn read_at(&self, number: u64) -> anyhow::Result<Option<Block>> {
        if number == 0 {
            return Ok(None);
        }
        Ok(self.read_all()?.into_iter().nth((number - 1) as usize))
    }

    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T: ChainStore + ?Sized> ChainStore for Box<T> {
    fn append(&self, block: &Block) -> anyhow::Result<()> {
        (**self).append(block)
    }

    fn read_all(&self) -> anyhow::Result<Vec<Block>> {
        (**self).read_all()
    }

    fn read_last(&self) -> anyhow::Result<Option<Block>> {
        (**self).read_last()
    }

    fn read_at(&self, number: u64) -> anyhow::Result<Option<Block>> {
        (**self).read_at(number)
    }

    fn close(&self) -> anyhow::Result<()> {
        (**self).close()
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Mutex<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: Mutex::new(blocks),
        }
    }
}

impl ChainStore for MemoryStore {
    fn append(&self, block: &Block) -> anyhow::Result<()> {
        self.blocks.lock().push(block.clone());
        Ok(())
    }

    fn read_all(&self) -> anyhow::Result<Vec<Block>> {
        Ok(self.blocks.lock().clone())
    }

    fn read_last(&self) -> anyhow::Result<Option<Block>> {
        Ok(self.blocks.lock().last().cloned())
    }

    fn read_at(&self, number: u64) -> anyhow::Result<Option<Block>> {
        let blocks = self.blocks.lock();
        Ok(number
            .checked_sub(1)
            .and_then(|i| blocks.get(i as usize))
            .cloned())
    }
}

/// Append-only, hash-chained block sequence with a cached tip.
pub struct Ledger<S: ChainStore> {
    store: Arc<S>,
    tip: Option<Block>,
    current_number: u64,
    difficulty: usize,
    max_transactions: usize,
}

impl<S: ChainStore> Ledger<S> {
    /// Open the ledger over `store`, recovering the tip from whatever is
    /// already persisted.
    pub fn open(store: Arc<S>, config: &ChainConfig) -> Result<Self> {
        let tip = match config.recovery {
            RecoveryMode::Fast => {
                let tip = store
                    .read_last()
                    .context("reading trailing record")
                    .map_err(LedgerError::Persistence)?;
                if let Some(tip) = &tip {
                    check_record(tip)?;
                }
                tip
            }
            RecoveryMode::Full => {
                let blocks = store
                    .read_all()
                    .context("reading chain")
                    .map_err(LedgerError::Persistence)?;
                verify_chain(&blocks)?;
                blocks.into_iter().last()
            }
        };
        let current_number = tip.as_ref().map_or(0, |b| b.number);
        info!(
            height = current_number,
            recovery = ?config.recovery,
            "ledger opened"
        );
        Ok(Self {
            store,
            tip,
            current_number,
            difficulty: config.difficulty,
            max_transactions: config.batch_size,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn tip(&self) -> Option<&Block> {
        self.tip.as_ref()
    }

    pub fn current_number(&self) -> u64 {
        self.current_number
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Number and previous hash the next block will carry.
    pub fn next_link(&self) -> (u64, Hash) {
        let previous_hash = self
            .tip
            .as_ref()
            .map_or_else(|| GENESIS_PREVIOUS_HASH.to_string(), |b| b.hash.clone());
        (self.current_number + 1, previous_hash)
    }

    /// Seal `skeleton` as the next block and persist it.
    ///
    /// Tip and count only move once the store accepted the record.
    pub fn append(&mut self, skeleton: &BlockSkeleton) -> Result<Block> {
        let now = now_millis();
        if skeleton.timestamp > now {
            return Err(LedgerError::validation(format!(
                "block timestamp {} is ahead of the ledger clock ({now})",
                skeleton.timestamp
            )));
        }
        if skeleton.difficulty != self.difficulty {
            return Err(LedgerError::validation(format!(
                "block difficulty {} does not match configured difficulty {}",
                skeleton.difficulty, self.difficulty
            )));
        }
        if skeleton.transactions.len() > self.max_transactions {
            return Err(LedgerError::validation(format!(
                "{} transactions exceed the block limit of {}",
                skeleton.transactions.len(),
                self.max_transactions
            )));
        }

        let (number, previous_hash) = self.next_link();
        let mut block = Block {
            number,
            timestamp: skeleton.timestamp,
            transactions: skeleton.transactions.clone(),
            difficulty: skeleton.difficulty,
            nonce: skeleton.nonce,
            previous_hash,
            hash: Hash::new(),
        };
        block.hash = block.compute_hash()?;
        if !meets_difficulty(&block.hash, block.difficulty) {
            return Err(LedgerError::validation(format!(
                "hash {} does not satisfy difficulty {}",
                block.hash, block.difficulty
            )));
        }

        self.store
            .append(&block)
            .with_context(|| format!("appending block {number}"))
            .map_err(LedgerError::Persistence)?;
        debug!(number, hash = %block.hash, "block appended");

        self.tip = Some(block.clone());
        self.current_number = number;
        Ok(block)
    }

    /// `-1` is the latest block, `1..=current_number` a specific one.
    pub fn get(&self, index: i64) -> Result<Block> {
        match index {
            -1 => self.tip.clone().ok_or(LedgerError::NotFound(index)),
            n if n >= 1 && n as u64 <= self.current_number => {
                let number = n as u64;
                if let Some(tip) = self.tip.as_ref().filter(|t| t.number == number) {
                    return Ok(tip.clone());
                }
                self.store
                    .read_at(number)
                    .with_context(|| format!("reading block {number}"))
                    .map_err(LedgerError::Persistence)?
                    .ok_or(LedgerError::NotFound(index))
            }
            _ => Err(LedgerError::NotFound(index)),
        }
    }

    pub fn get_all(&self) -> Result<Vec<Block>> {
        self.store
            .read_all()
            .context("reading chain")
            .map_err(LedgerError::Persistence)
    }

    /// Re-verify the whole persisted chain against the cached tip.
    pub fn verify(&self) -> Result<()> {
        let blocks = self.get_all()?;
        verify_chain(&blocks)?;
        let stored = blocks.last().map_or(0, |b| b.number);
        if stored != self.current_number {
            return Err(LedgerError::integrity(format!(
                "store holds {stored} blocks but the ledger tip is {}",
                self.current_number
            )));
        }
        Ok(())
    }
}

/// Checks one record in isolation: positive number, hash matches content,
/// hash meets its difficulty, and block 1 links to the genesis sentinel.
pub fn check_record(block: &Block) -> Result<()> {
    if block.number == 0 {
        return Err(LedgerError::integrity("block number 0 is not allowed"));
    }
    let expected = block.compute_hash()?;
    if expected != block.hash {
        return Err(LedgerError::integrity(format!(
            "block {} hash mismatch: stored {}, computed {expected}",
            block.number, block.hash
        )));
    }
    if !meets_difficulty(&block.hash, block.difficulty) {
        return Err(LedgerError::integrity(format!(
            "block {} hash does not satisfy difficulty {}",
            block.number, block.difficulty
        )));
    }
    if block.number == 1 && block.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(LedgerError::integrity(
            "block 1 does not link to the genesis sentinel",
        ));
    }
    Ok(())
}

/// Sequential numbering from 1, hash linkage and difficulty for a full chain.
pub fn verify_chain(blocks: &[Block]) -> Result<()> {
    blocks
        .par_iter()
        .enumerate()
        .try_for_each(|(i, block)| {
            if block.number != i as u64 + 1 {
                return Err(LedgerError::integrity(format!(
                    "record {} carries number {}",
                    i + 1,
                    block.number
                )));
            }
            check_record(block)
        })?;

    for pair in blocks.windows(2) {
        if pair[1].previous_hash != pair[0].hash {
            return Err(LedgerError::integrity(format!(
                "block {} does not link to block {}",
                pair[1].number, pair[0].number
            )));
        }
    }
    Ok(())
}
