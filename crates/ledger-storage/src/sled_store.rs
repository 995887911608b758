use anyhow::{anyhow, Context, Result};
use ledger_core::{Block, ChainStore};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

/// Blocks keyed by big-endian number, valued by their JSON encoding.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled at {}", path.as_ref().display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(blocks = blocks.len(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// In-memory database removed on drop.
  pub fn open_temporary() -> Result<Self> {
    let db = sled::Config::new().temporary(true).open()?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    Ok(Self { db, blocks })
  }
}

fn decode(value: &IVec) -> Result<Block> {
  Ok(serde_json::from_slice(value)?)
}

impl ChainStore for SledStore {
  fn append(&self, block: &Block) -> Result<()> {
    let key = block.number.to_be_bytes();
    let bytes = serde_json::to_vec(block)?;
    // history is immutable: refuse to overwrite an existing number
    self
      .blocks
      .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
      .map_err(|_| anyhow!("block {} is already stored", block.number))?;
    self.db.flush()?;
    debug!(number = block.number, "block stored");
    Ok(())
  }

  fn read_all(&self) -> Result<Vec<Block>> {
    self
      .blocks
      .iter()
      .values()
      .map(|value| decode(&value?))
      .collect()
  }

  fn read_last(&self) -> Result<Option<Block>> {
    self
      .blocks
      .last()?
      .map(|(_, value)| decode(&value))
      .transpose()
  }

  fn read_at(&self, number: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(number.to_be_bytes())?
      .map(|value| decode(&value))
      .transpose()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
