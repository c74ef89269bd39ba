//! Periodic reconciliation of the entity shadow cache
//!
//! The tracker is mutated by other actors too; the engine's cache drifts.
//! A background sweep re-fetches every cached entity on a configurable
//! interval, fully decoupled from the confirm/reject hot path.

use crate::engine::WorkflowEngine;
use greenlight_proposal::EntityRef;
use tokio::task::JoinHandle;

/// Handle to the running reconciliation loop; aborts the loop on drop
#[derive(Debug)]
pub struct ReconcilerHandle {
    handle: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Stop the loop explicitly
    pub fn abort(self) {
        self.handle.abort();
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl WorkflowEngine {
    /// Start the reconciliation loop at the configured interval
    #[must_use]
    pub fn spawn_reconciler(&self) -> ReconcilerHandle {
        let inner = std::sync::Arc::clone(&self.inner);
        let interval = inner.config.reconcile_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would race engine startup; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for external_id in inner.cache.tracked_ids() {
                    match inner.adapter.fetch(&EntityRef::new(&external_id)).await {
                        Ok(snapshot) => inner.cache.apply_snapshot(&snapshot),
                        Err(err) => {
                            tracing::debug!(%external_id, error = %err, "reconcile fetch failed");
                        }
                    }
                }
            }
        });
        ReconcilerHandle { handle }
    }
}
