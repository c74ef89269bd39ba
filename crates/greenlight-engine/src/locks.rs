//! Per-target-entity serialization locks
//!
//! Two different proposals aiming at the same external entity must apply
//! one at a time, in confirm-arrival order, or concurrent status changes
//! race to a lost update at the tracker. One async mutex per lock key;
//! `tokio::sync::Mutex` queues waiters FIFO, which is exactly the
//! per-entity total order the ledger promises.
//!
//! Entries are never reaped: the table is bounded by distinct lock keys
//! seen over the process lifetime, which is fine for session-scoped load.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while a confirmation drives a mutation for its lock key
pub type EntityGuard = OwnedMutexGuard<()>;

/// Lock table keyed by entity lock key
#[derive(Debug, Default)]
pub struct LockTable {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting behind earlier confirms
    ///
    /// Cooperative: waiting parks the task, it never spins.
    pub async fn acquire(&self, key: &str) -> EntityGuard {
        let lock = self
            .inner
            .entry(key.to_owned())
            .or_default()
            .clone();
        tracing::debug!(key, "acquiring entity lock");
        lock.lock_owned().await
    }

    /// Number of distinct lock keys seen so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no lock key has been seen yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
