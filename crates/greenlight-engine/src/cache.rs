//! External entity shadow cache
//!
//! A best-effort mirror of tracker entities the engine has touched or been
//! told about. Refreshed after every applied mutation and from the
//! periodic reconciler; consulted for etag hints when driving status
//! changes so the tracker can reject updates against entities that moved
//! under us.

use chrono::Utc;
use dashmap::DashMap;
use greenlight_proposal::ExternalEntityRecord;
use greenlight_tracker::{EntitySnapshot, MutationOutcome};

/// Shadow cache keyed by tracker entity id
#[derive(Debug, Default)]
pub struct EntityCache {
    inner: DashMap<String, ExternalEntityRecord>,
}

impl EntityCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cached record for a tracker entity
    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<ExternalEntityRecord> {
        self.inner.get(external_id).map(|r| r.clone())
    }

    /// Fold a fetched snapshot into the cache
    pub fn apply_snapshot(&self, snapshot: &EntitySnapshot) {
        self.inner.insert(
            snapshot.external_id.clone(),
            ExternalEntityRecord {
                external_id: snapshot.external_id.clone(),
                last_known_status: snapshot.status.clone(),
                last_synced_at: Utc::now(),
                etag: snapshot.etag.clone(),
            },
        );
    }

    /// Fold the result of our own mutation into the cache
    pub fn apply_outcome(&self, outcome: &MutationOutcome) {
        self.inner.insert(
            outcome.external_id.clone(),
            ExternalEntityRecord {
                external_id: outcome.external_id.clone(),
                last_known_status: outcome.status.clone(),
                last_synced_at: Utc::now(),
                etag: outcome.etag.clone(),
            },
        );
    }

    /// Ids of every cached entity, for the reconciliation sweep
    #[must_use]
    pub fn tracked_ids(&self) -> Vec<String> {
        self.inner.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of cached entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_overwrites_snapshot() {
        let cache = EntityCache::new();
        cache.apply_snapshot(&EntitySnapshot {
            external_id: "issue-42".into(),
            status: Some("Todo".into()),
            etag: Some("v1".into()),
        });
        cache.apply_outcome(&MutationOutcome {
            external_id: "issue-42".into(),
            etag: Some("v2".into()),
            status: Some("Done".into()),
        });

        let record = cache.get("issue-42").unwrap();
        assert_eq!(record.last_known_status.as_deref(), Some("Done"));
        assert_eq!(record.etag.as_deref(), Some("v2"));
        assert_eq!(cache.tracked_ids(), vec!["issue-42".to_owned()]);
    }
}
