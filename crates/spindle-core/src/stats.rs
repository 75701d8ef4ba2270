//! Worker counters and the serializable snapshot built from them.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::WorkerState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub state: WorkerState,
    /// Items whose handler returned `Ok`.
    pub processed: u64,
    /// Items whose handler returned `Err` or panicked.
    pub failed: u64,
    /// Items dropped unprocessed by an abandoning stop or a dropped worker.
    pub abandoned: u64,
    /// Items still buffered in the queue.
    pub pending: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Shared between the worker handle and its loop.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
    stopped_at: Mutex<Option<DateTime<Utc>>>,
}

impl Counters {
    pub(crate) fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, n: usize) {
        self.abandoned.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn mark_started(&self) {
        *self.started_at.lock() = Some(Utc::now());
    }

    pub(crate) fn mark_stopped(&self) {
        *self.stopped_at.lock() = Some(Utc::now());
    }

    pub(crate) fn snapshot(&self, state: WorkerState, pending: usize) -> WorkerStats {
        WorkerStats {
            state,
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            pending,
            started_at: *self.started_at.lock(),
            stopped_at: *self.stopped_at.lock(),
        }
    }
}
