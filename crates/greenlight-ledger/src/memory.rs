//! In-memory ledger

use crate::record::{
    ApplicationLedger, ApplicationRecord, LedgerError, WriteIfAbsent,
};
use dashmap::DashMap;
use greenlight_proposal::ProposalId;

/// DashMap-backed ledger for tests and single-process deployments
///
/// The entry API gives the same atomic write-if-absent the SQLite
/// backend gets from its primary-key constraint.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    by_key: DashMap<String, ApplicationRecord>,
    by_proposal: DashMap<ProposalId, String>,
}

impl MemoryLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records written
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether no record has been written yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[async_trait::async_trait]
impl ApplicationLedger for MemoryLedger {
    async fn write_if_absent(
        &self,
        record: ApplicationRecord,
    ) -> Result<WriteIfAbsent, LedgerError> {
        let key = record.idempotency_key.as_str().to_owned();
        match self.by_key.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Ok(WriteIfAbsent {
                inserted: false,
                record: existing.get().clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.by_proposal.insert(record.proposal_id, key);
                slot.insert(record.clone());
                Ok(WriteIfAbsent {
                    inserted: true,
                    record,
                })
            }
        }
    }

    async fn find_by_proposal(
        &self,
        proposal_id: ProposalId,
    ) -> Result<Option<ApplicationRecord>, LedgerError> {
        let Some(key) = self.by_proposal.get(&proposal_id) else {
            return Ok(None);
        };
        Ok(self.by_key.get(key.value()).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Outcome;

    #[tokio::test]
    async fn write_if_absent_keeps_the_first_record() {
        let ledger = MemoryLedger::new();
        let id = ProposalId::new();

        let first = ledger
            .write_if_absent(ApplicationRecord::success(id, "gh-1"))
            .await
            .unwrap();
        assert!(first.inserted);

        let second = ledger
            .write_if_absent(ApplicationRecord::failure(id, "tracker_permanent"))
            .await
            .unwrap();
        assert!(!second.inserted);
        assert_eq!(second.record.outcome, Outcome::Success);
        assert_eq!(second.record.external_mutation_id.as_deref(), Some("gh-1"));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn find_by_proposal_round_trips() {
        let ledger = MemoryLedger::new();
        let id = ProposalId::new();
        assert!(ledger.find_by_proposal(id).await.unwrap().is_none());

        ledger
            .write_if_absent(ApplicationRecord::success(id, "gh-2"))
            .await
            .unwrap();
        let found = ledger.find_by_proposal(id).await.unwrap().unwrap();
        assert_eq!(found.proposal_id, id);
        assert_eq!(found.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn concurrent_writers_see_one_insert() {
        use std::sync::Arc;

        let ledger = Arc::new(MemoryLedger::new());
        let id = ProposalId::new();

        let mut handles = Vec::new();
        for n in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .write_if_absent(ApplicationRecord::success(id, format!("gh-{n}")))
                    .await
                    .unwrap()
                    .inserted
            }));
        }

        let mut inserts = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserts += 1;
            }
        }
        assert_eq!(inserts, 1);
        assert_eq!(ledger.len(), 1);
    }
}
