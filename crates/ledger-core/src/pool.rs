use crate::{Result, Transaction, TransactionRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// FIFO buffer of admitted, not-yet-sealed transactions.
///
/// Every operation takes the internal lock once, so `admit` and `drain` can
/// run from different tasks without losing or duplicating entries.
#[derive(Debug, Default)]
pub struct TransactionPool {
    pending: Mutex<VecDeque<Transaction>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `request` and append it at the tail.
    pub fn admit(&self, request: TransactionRequest) -> Result<()> {
        let tx = Transaction::try_from(request)?;
        self.pending.lock().push_back(tx);
        Ok(())
    }

    /// Remove and return up to `max` transactions from the head, oldest first.
    pub fn drain(&self, max: usize) -> Vec<Transaction> {
        let mut pending = self.pending.lock();
        let n = max.min(pending.len());
        pending.drain(..n).collect()
    }

    /// Copy up to `max` transactions from the head without removing them.
    pub fn peek(&self, max: usize) -> Vec<Transaction> {
        self.pending.lock().iter().take(max).cloned().collect()
    }

    /// Put previously drained transactions back at the head, keeping their order.
    pub fn requeue(&self, txs: Vec<Transaction>) {
        let mut pending = self.pending.lock();
        for tx in txs.into_iter().rev() {
            pending.push_front(tx);
        }
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Drop every pending transaction, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.len();
        pending.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
