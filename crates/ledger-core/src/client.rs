use crate::activity::ActivityLog;
use crate::chain::{ChainStore, Ledger};
use crate::mine::{MinerState, MiningEngine, MiningEvent};
use crate::{Block, ChainConfig, LedgerError, Result, Transaction, TransactionPool, TransactionRequest};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// One addressable node: a pool, a ledger and a miner behind a single handle.
pub struct Client<S: ChainStore + 'static> {
    identity: String,
    ledger: Arc<RwLock<Ledger<S>>>,
    pool: Arc<TransactionPool>,
    engine: MiningEngine<S>,
    activity: Arc<dyn ActivityLog>,
}

impl<S: ChainStore + 'static> Client<S> {
    /// Open the node's ledger over `store` and wire up a stopped miner.
    pub fn open(
        identity: impl Into<String>,
        store: S,
        config: ChainConfig,
        activity: Arc<dyn ActivityLog>,
    ) -> Result<Self> {
        config.validate()?;
        let identity = identity.into();
        let ledger = Arc::new(RwLock::new(Ledger::open(Arc::new(store), &config)?));
        let pool = Arc::new(TransactionPool::new());
        let engine = MiningEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&pool),
            config,
            Arc::clone(&activity),
        );
        info!(%identity, height = ledger.read().current_number(), "client ready");
        activity.record(&format!("New blockchain client started with id: {identity}"));
        Ok(Self {
            identity,
            ledger,
            pool,
            engine,
            activity,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn submit_transaction(&self, request: TransactionRequest) -> Result<()> {
        self.pool.admit(request)
    }

    /// Start or stop mining. Requires a Tokio runtime when enabling.
    pub fn mine(&self, enable: bool) {
        if enable {
            if self.engine.start() {
                self.activity
                    .record(&format!("Mining started for client with id: {}", self.identity));
            }
        } else if self.engine.stop() {
            self.activity.record("Mining stopped");
        }
    }

    pub fn get_block_number(&self) -> u64 {
        self.ledger.read().current_number()
    }

    /// `-1` returns the latest block.
    pub fn get_block_at(&self, number: i64) -> Result<Block> {
        self.ledger.read().get(number)
    }

    pub fn get_all_blocks(&self) -> Result<Vec<Block>> {
        self.ledger.read().get_all()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.pool.snapshot()
    }

    /// Discard every transaction not yet sealed, returning how many were dropped.
    ///
    /// A batch already drained into a block being committed is unaffected.
    pub fn clear_pending_transactions(&self) -> usize {
        let dropped = self.pool.clear();
        info!(identity = %self.identity, dropped, "pending transactions cleared");
        dropped
    }

    pub fn mining_state(&self) -> MinerState {
        self.engine.state()
    }

    pub fn last_mining_error(&self) -> Option<String> {
        self.engine.last_error()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MiningEvent> {
        self.engine.subscribe()
    }

    pub fn difficulty(&self) -> usize {
        self.engine.config().difficulty
    }

    /// Re-check numbering, linkage and difficulty over everything persisted so far.
    pub fn verify_chain(&self) -> Result<()> {
        self.ledger.read().verify()
    }

    /// Stop mining and release the store.
    pub fn shutdown(&self) -> Result<()> {
        self.mine(false);
        self.ledger
            .read()
            .store()
            .close()
            .map_err(LedgerError::Persistence)
    }
}
