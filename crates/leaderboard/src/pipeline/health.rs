use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use serde::Serialize;
use std::collections::VecDeque;

/// Live counters shared between a pipeline's publishers and its worker.
#[derive(Debug)]
pub(crate) struct PipelineHealth {
    alive: AtomicBool,
    processed: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
    last_failure: Mutex<Option<String>>,
}

impl PipelineHealth {
    pub(crate) fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Must be called before the message is sent so the worker can never
    /// observe a consumed message that was not counted.
    pub(crate) fn record_enqueued(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Reverts [`PipelineHealth::record_enqueued`] when the send failed.
    pub(crate) fn record_rejected(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, reason: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(reason.to_owned());
    }

    pub(crate) fn report(&self, name: &str, dead_lettered: u64) -> HealthReport {
        HealthReport {
            name: name.to_owned(),
            alive: self.is_alive(),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_lettered,
            pending: self.pending(),
            last_failure: self.last_failure.lock().clone(),
        }
    }
}

/// Point-in-time view of a pipeline's state, suitable for health endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub name: String,
    /// `false` once the worker has stopped.
    pub alive: bool,
    /// Messages handled successfully.
    pub processed: u64,
    /// Messages whose handling failed or panicked.
    pub failed: u64,
    /// Messages ever moved to the dead-letter queue, including evicted ones.
    pub dead_lettered: u64,
    /// Messages published but not yet picked up by the worker.
    pub pending: u64,
    pub last_failure: Option<String>,
}

/// A message the handler failed on, with the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetter<M> {
    pub message: M,
    pub reason: String,
}

/// Bounded FIFO of failed messages; the oldest entry is evicted when full.
#[derive(Debug)]
pub(crate) struct DeadLetters<M> {
    entries: Mutex<VecDeque<DeadLetter<M>>>,
    capacity: usize,
    total: AtomicU64,
}

impl<M> DeadLetters<M> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            total: AtomicU64::new(0),
        }
    }

    pub(crate) fn push(&self, letter: DeadLetter<M>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(letter);
    }

    pub(crate) fn drain(&self) -> Vec<DeadLetter<M>> {
        self.entries.lock().drain(..).collect()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
