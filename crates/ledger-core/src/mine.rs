//! Proof-of-work mining engine.
//!
//! The search runs as a Tokio task in small steps (`attempts_per_tick` nonces,
//! then a sleep or a yield) so transaction admission is never starved. A step
//! hashes a candidate built from the ledger tip and the head of the pool; on a
//! match the engine pauses, drains exactly that batch, and appends it.
//!
//! The control mutex is held across the whole drain → build → append sequence.
//! That is the `Paused` state: no other step can observe the same tip, and
//! `stop()` cannot return while a commit is in flight.

use crate::activity::ActivityLog;
use crate::chain::{ChainStore, Ledger};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::{now_millis, pow, Block, BlockContent, BlockSkeleton, ChainConfig, LedgerError};
use crate::{Transaction, TransactionPool};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerState {
    Idle,
    Searching,
    /// A block is being committed; search steps are suppressed.
    Paused,
}

#[derive(Debug, Clone)]
pub enum MiningEvent {
    Mined(Block),
    /// The engine stopped itself after a commit failure.
    Halted(String),
}

struct Control {
    state: MinerState,
    /// Bumped by every start and stop; a worker exits once its generation is stale.
    generation: u64,
    last_error: Option<String>,
}

struct Shared<S: ChainStore> {
    ledger: Arc<RwLock<Ledger<S>>>,
    pool: Arc<TransactionPool>,
    config: ChainConfig,
    control: Mutex<Control>,
    events: broadcast::Sender<MiningEvent>,
    activity: Arc<dyn ActivityLog>,
}

pub struct MiningEngine<S: ChainStore + 'static> {
    shared: Arc<Shared<S>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Round {
    nonce: u64,
    timestamp: i64,
}

impl Round {
    fn fresh() -> Self {
        Self {
            nonce: 0,
            timestamp: now_millis(),
        }
    }
}

enum Step {
    Continue,
    Stop,
}

impl<S: ChainStore + 'static> MiningEngine<S> {
    pub fn new(
        ledger: Arc<RwLock<Ledger<S>>>,
        pool: Arc<TransactionPool>,
        config: ChainConfig,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                ledger,
                pool,
                config,
                control: Mutex::new(Control {
                    state: MinerState::Idle,
                    generation: 0,
                    last_error: None,
                }),
                events,
                activity,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Begin searching. Returns `false` if the engine was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let generation = {
            let mut control = self.shared.control.lock();
            if control.state != MinerState::Idle {
                return false;
            }
            control.state = MinerState::Searching;
            control.generation += 1;
            control.last_error = None;
            control.generation
        };

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(shared.run(generation));
        if let Some(previous) = self.worker.lock().replace(handle) {
            previous.abort();
        }
        info!(
            generation,
            difficulty = self.shared.config.difficulty,
            "mining started"
        );
        true
    }

    /// Return to `Idle`. Waits for an in-flight commit; nothing is committed
    /// after this returns. Returns `false` if the engine was already idle.
    pub fn stop(&self) -> bool {
        let previous = {
            let mut control = self.shared.control.lock();
            control.generation += 1;
            std::mem::replace(&mut control.state, MinerState::Idle)
        };
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
        if previous != MinerState::Idle {
            info!("mining stopped");
        }
        previous != MinerState::Idle
    }

    pub fn state(&self) -> MinerState {
        self.shared.control.lock().state
    }

    /// Why the engine last halted itself, cleared on the next `start()`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.control.lock().last_error.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MiningEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.shared.config
    }
}

impl<S: ChainStore + 'static> Drop for MiningEngine<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: ChainStore + 'static> Shared<S> {
    async fn run(self: Arc<Self>, generation: u64) {
        let tick = self.config.tick();
        let mut round = Round::fresh();
        loop {
            if tick.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(tick).await;
            }
            if let Step::Stop = self.step(generation, &mut round) {
                break;
            }
        }
        debug!(generation, "mining worker exited");
    }

    fn step(&self, generation: u64, round: &mut Round) -> Step {
        {
            let control = self.control.lock();
            if control.generation != generation {
                return Step::Stop;
            }
            if control.state != MinerState::Searching {
                return Step::Continue;
            }
        }

        let (number, previous_hash) = self.ledger.read().next_link();
        let batch = self.pool.peek(self.config.batch_size);
        let mut candidate = BlockContent {
            number,
            timestamp: round.timestamp,
            transactions: &batch,
            difficulty: self.config.difficulty,
            nonce: round.nonce,
            previous_hash: &previous_hash,
        };
        let found = pow::search(&mut candidate, self.config.attempts_per_tick);
        let nonce = candidate.nonce;
        match found {
            Ok(None) => {
                round.nonce = nonce;
                Step::Continue
            }
            Ok(Some(hash)) => {
                debug!(number, nonce, %hash, "proof of work found");
                self.commit(generation, round, nonce, batch)
            }
            Err(err) => {
                let mut control = self.control.lock();
                if control.generation != generation {
                    return Step::Stop;
                }
                self.halt(&mut control, err)
            }
        }
    }

    fn commit(
        &self,
        generation: u64,
        round: &mut Round,
        nonce: u64,
        batch: Vec<Transaction>,
    ) -> Step {
        let mut control = self.control.lock();
        if control.generation != generation || control.state != MinerState::Searching {
            return Step::Stop;
        }
        control.state = MinerState::Paused;

        let drained = self.pool.drain(batch.len());
        if drained != batch {
            // head moved since the candidate was built (pool cleared); start over
            self.pool.requeue(drained);
            control.state = MinerState::Searching;
            *round = Round::fresh();
            return Step::Continue;
        }

        let skeleton = BlockSkeleton {
            timestamp: round.timestamp,
            transactions: drained,
            difficulty: self.config.difficulty,
            nonce,
        };
        let outcome = self.ledger.write().append(&skeleton);
        match outcome {
            Ok(block) => {
                info!(
                    number = block.number,
                    nonce,
                    txs = block.transactions.len(),
                    hash = %block.hash,
                    "mined block"
                );
                self.activity.record(&format!(
                    "Block {} mined with difficulty={} at {}",
                    block.number,
                    block.difficulty,
                    chrono::Utc::now().to_rfc2822()
                ));
                let _ = self.events.send(MiningEvent::Mined(block));
                control.state = MinerState::Searching;
                *round = Round::fresh();
                Step::Continue
            }
            Err(err) => {
                self.pool.requeue(skeleton.transactions);
                match err {
                    LedgerError::Validation(reason) => {
                        warn!(%reason, "block rejected, restarting round");
                        control.state = MinerState::Searching;
                        *round = Round::fresh();
                        Step::Continue
                    }
                    other => self.halt(&mut control, other),
                }
            }
        }
    }

    fn halt(&self, control: &mut Control, err: LedgerError) -> Step {
        let reason = err.to_string();
        error!(%reason, "mining halted");
        self.activity.record(&format!("Mining halted: {reason}"));
        control.state = MinerState::Idle;
        control.last_error = Some(reason.clone());
        let _ = self.events.send(MiningEvent::Halted(reason));
        Step::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryStore;
    use crate::TransactionRequest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    fn fast_config(difficulty: usize) -> ChainConfig {
        ChainConfig {
            difficulty,
            tick_ms: 0,
            attempts_per_tick: 16,
            ..ChainConfig::default()
        }
    }

    fn engine<S: ChainStore + 'static>(
        store: S,
        config: ChainConfig,
    ) -> (MiningEngine<S>, Arc<RwLock<Ledger<S>>>, Arc<TransactionPool>) {
        let ledger = Arc::new(RwLock::new(
            Ledger::open(Arc::new(store), &config).unwrap(),
        ));
        let pool = Arc::new(TransactionPool::new());
        let engine = MiningEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&pool),
            config,
            Arc::new(crate::TracingActivityLog),
        );
        (engine, ledger, pool)
    }

    async fn next_mined(rx: &mut broadcast::Receiver<MiningEvent>) -> Block {
        loop {
            match timeout(Duration::from_secs(10), rx.recv()).await {
                Ok(Ok(MiningEvent::Mined(block))) => return block,
                Ok(Ok(MiningEvent::Halted(reason))) => panic!("halted: {reason}"),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(err)) => panic!("channel closed: {err}"),
                Err(_) => panic!("timed out waiting for a block"),
            }
        }
    }

    /// Accepts `ok` appends, then fails every later one.
    struct FlakyStore {
        inner: MemoryStore,
        ok: usize,
        calls: AtomicUsize,
    }

    impl ChainStore for FlakyStore {
        fn append(&self, block: &Block) -> anyhow::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok {
                anyhow::bail!("write failed");
            }
            self.inner.append(block)
        }

        fn read_all(&self) -> anyhow::Result<Vec<Block>> {
            self.inner.read_all()
        }
    }

    #[tokio::test]
    async fn seals_pool_in_batches_of_five() {
        let (engine, ledger, pool) = engine(MemoryStore::new(), fast_config(0));
        for i in 1..=7 {
            pool.admit(TransactionRequest::new(i, format!("t{i}"))).unwrap();
        }
        let mut rx = engine.subscribe();
        assert!(engine.start());
        next_mined(&mut rx).await;
        next_mined(&mut rx).await;
        engine.stop();
        let first = ledger.read().get(1).unwrap();
        let second = ledger.read().get(2).unwrap();

        let data = |b: &Block| b.transactions.iter().map(|t| t.data.clone()).collect::<Vec<_>>();
        assert_eq!(first.number, 1);
        assert_eq!(
            data(&first),
            vec![json!("t1"), json!("t2"), json!("t3"), json!("t4"), json!("t5")]
        );
        assert_eq!(second.number, 2);
        assert_eq!(data(&second), vec![json!("t6"), json!("t7")]);
        assert_eq!(second.previous_hash, first.hash);
        assert!(pool.is_empty());
        assert!(ledger.read().current_number() >= 2);
    }

    #[tokio::test]
    async fn mined_blocks_satisfy_difficulty() {
        let (engine, ledger, pool) = engine(MemoryStore::new(), fast_config(1));
        pool.admit(TransactionRequest::now("payload")).unwrap();
        let mut rx = engine.subscribe();
        engine.start();
        for _ in 0..3 {
            let block = next_mined(&mut rx).await;
            assert!(block.hash.starts_with('0'));
            assert_eq!(block.difficulty, 1);
        }
        engine.stop();
        ledger.read().verify().unwrap();
    }

    #[tokio::test]
    async fn stop_right_after_start_commits_nothing() {
        let (engine, ledger, _pool) = engine(MemoryStore::new(), fast_config(0));
        engine.start();
        engine.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ledger.read().current_number(), 0);
        assert_eq!(engine.state(), MinerState::Idle);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (engine, _ledger, _pool) = engine(MemoryStore::new(), fast_config(3));
        assert!(!engine.stop());
        assert!(engine.start());
        assert!(!engine.start());
        assert_eq!(engine.state(), MinerState::Searching);
        assert!(engine.stop());
        assert!(!engine.stop());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn nothing_commits_after_stop_returns() {
        let (engine, ledger, _pool) = engine(MemoryStore::new(), fast_config(0));
        let mut rx = engine.subscribe();
        engine.start();
        next_mined(&mut rx).await;
        engine.stop();
        let height = ledger.read().current_number();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ledger.read().current_number(), height);
    }

    #[tokio::test]
    async fn failed_commit_requeues_and_halts() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            ok: 1,
            calls: AtomicUsize::new(0),
        };
        let (engine, ledger, pool) = engine(store, fast_config(0));
        for i in 1..=7 {
            pool.admit(TransactionRequest::new(i, format!("t{i}"))).unwrap();
        }
        let mut rx = engine.subscribe();
        engine.start();
        next_mined(&mut rx).await;

        let halted = loop {
            match timeout(Duration::from_secs(10), rx.recv()).await {
                Ok(Ok(MiningEvent::Halted(reason))) => break reason,
                Ok(Ok(MiningEvent::Mined(block))) => panic!("unexpected block {}", block.number),
                other => panic!("unexpected event: {other:?}"),
            }
        };
        assert!(halted.contains("write failed"));
        assert_eq!(engine.state(), MinerState::Idle);
        assert_eq!(engine.last_error().as_deref(), Some(halted.as_str()));
        assert_eq!(ledger.read().current_number(), 1);

        let left: Vec<_> = pool.snapshot().into_iter().map(|t| t.data).collect();
        assert_eq!(left, vec![json!("t6"), json!("t7")]);
    }

    #[tokio::test]
    async fn rejected_block_requeues_and_keeps_searching() {
        // ledger demands difficulty 1 while the engine seals at 0: every append is rejected
        let ledger = Arc::new(RwLock::new(
            Ledger::open(Arc::new(MemoryStore::new()), &fast_config(1)).unwrap(),
        ));
        let pool = Arc::new(TransactionPool::new());
        let engine = MiningEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&pool),
            fast_config(0),
            Arc::new(crate::TracingActivityLog),
        );
        for i in 1..=7 {
            pool.admit(TransactionRequest::new(i, format!("t{i}"))).unwrap();
        }
        let mut rx = engine.subscribe();
        engine.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(engine.state(), MinerState::Searching);
        assert!(engine.last_error().is_none());
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
        engine.stop();

        assert_eq!(ledger.read().current_number(), 0);
        let left: Vec<_> = pool.snapshot().into_iter().map(|t| t.data).collect();
        let expected: Vec<_> = (1..=7).map(|i| json!(format!("t{i}"))).collect();
        assert_eq!(left, expected);
    }

    #[test]
    fn stale_batch_is_put_back_without_committing() {
        let (engine, ledger, pool) = engine(MemoryStore::new(), fast_config(0));
        for i in 1..=3 {
            pool.admit(TransactionRequest::new(i, format!("t{i}"))).unwrap();
        }
        let stale = pool.peek(5);
        assert_eq!(pool.clear(), 3);
        pool.admit(TransactionRequest::new(9, "t9")).unwrap();

        let generation = {
            let mut control = engine.shared.control.lock();
            control.state = MinerState::Searching;
            control.generation += 1;
            control.generation
        };
        let mut round = Round::fresh();
        let step = engine.shared.commit(generation, &mut round, 0, stale);

        assert!(matches!(step, Step::Continue));
        assert_eq!(engine.state(), MinerState::Searching);
        assert_eq!(ledger.read().current_number(), 0);
        let left: Vec<_> = pool.snapshot().into_iter().map(|t| t.data).collect();
        assert_eq!(left, vec![json!("t9")]);
    }
}
