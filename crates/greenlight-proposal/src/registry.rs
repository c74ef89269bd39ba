//! Session-scoped proposal registry
//!
//! Holds all non-terminal proposals for active sessions and provides the
//! atomic compare-and-set transition that makes concurrent confirm/reject
//! calls safe. The registry is always injected, never a process global, so
//! tests isolate cleanly and instances can shard by session later.

use crate::error::RegistryError;
use crate::state::{validate_transition, ProposalState};
use crate::types::{Proposal, ProposalId, SessionId};
use chrono::Utc;
use dashmap::DashMap;

/// In-memory map of pending proposals, keyed by proposal id
///
/// All mutation goes through [`ProposalRegistry::transition`], which runs
/// under the map's shard lock: two racing transitions for the same proposal
/// are serialized there, and version checking decides the winner.
#[derive(Debug, Default)]
pub struct ProposalRegistry {
    inner: DashMap<ProposalId, Proposal>,
}

impl ProposalRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new proposal
    ///
    /// # Errors
    /// `DuplicateProposal` if the id is already present. Terminal proposals
    /// are removed rather than overwritten, so an id never recurs.
    pub fn insert(&self, proposal: Proposal) -> Result<(), RegistryError> {
        match self.inner.entry(proposal.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistryError::DuplicateProposal(proposal.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                tracing::debug!(id = %proposal.id, kind = proposal.payload.kind(), "proposal registered");
                slot.insert(proposal);
                Ok(())
            }
        }
    }

    /// Look up a proposal, enforcing session ownership
    ///
    /// # Errors
    /// `NotFound` for unknown ids *and* for proposals owned by another
    /// session; the caller cannot distinguish the two.
    pub fn get(&self, session: SessionId, id: ProposalId) -> Result<Proposal, RegistryError> {
        self.inner
            .get(&id)
            .filter(|p| p.session == session)
            .map(|p| p.clone())
            .ok_or(RegistryError::NotFound)
    }

    /// Atomic compare-and-set state transition
    ///
    /// Runs under the shard lock: checks `expected_version` against the
    /// current version, validates the transition against the lifecycle
    /// table, then bumps the version and stamps the transition time.
    ///
    /// # Errors
    /// `VersionConflict` when the caller's view is stale (the primary
    /// defense against two concurrent confirms), `IllegalTransition` when
    /// the lifecycle table forbids the move, `NotFound` for unknown ids.
    pub fn transition(
        &self,
        id: ProposalId,
        expected_version: u64,
        new_state: ProposalState,
    ) -> Result<Proposal, RegistryError> {
        let mut entry = self.inner.get_mut(&id).ok_or(RegistryError::NotFound)?;

        if entry.version != expected_version {
            return Err(RegistryError::VersionConflict {
                expected: expected_version,
                actual: entry.version,
            });
        }
        validate_transition(entry.state, new_state)?;

        entry.state = new_state;
        entry.version += 1;
        entry.last_transition_at = Utc::now();
        tracing::debug!(id = %id, state = %new_state, version = entry.version, "proposal transitioned");
        Ok(entry.clone())
    }

    /// Remove a finished proposal (user dismissed it)
    ///
    /// # Errors
    /// `NotTerminal` if the proposal has not reached `Applied`, `Failed`
    /// or `Rejected`; `NotFound` for unknown or foreign-session ids.
    pub fn remove_terminal(
        &self,
        session: SessionId,
        id: ProposalId,
    ) -> Result<Proposal, RegistryError> {
        // Entry API keeps check-then-remove atomic under the shard lock.
        match self.inner.entry(id) {
            dashmap::mapref::entry::Entry::Vacant(_) => Err(RegistryError::NotFound),
            dashmap::mapref::entry::Entry::Occupied(slot) => {
                if slot.get().session != session {
                    return Err(RegistryError::NotFound);
                }
                if !slot.get().is_terminal() {
                    return Err(RegistryError::NotTerminal(id));
                }
                Ok(slot.remove())
            }
        }
    }

    /// Drop every proposal owned by a session (session ended)
    pub fn drop_session(&self, session: SessionId) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, p| p.session != session);
        before - self.inner.len()
    }

    /// Snapshot of a session's non-terminal proposals, for UI re-render
    #[must_use]
    pub fn pending(&self, session: SessionId) -> Vec<Proposal> {
        let mut out: Vec<Proposal> = self
            .inner
            .iter()
            .filter(|p| p.session == session && !p.is_terminal())
            .map(|p| p.clone())
            .collect();
        out.sort_by_key(|p| p.id);
        out
    }

    /// Number of registered proposals across all sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityRef, ProposalPayload};

    fn status_change(session: SessionId) -> Proposal {
        Proposal::new(
            session,
            ProposalPayload::StatusChange {
                from_status: Some("Todo".into()),
                to_status: "Done".into(),
            },
            Some(EntityRef::new("issue-42")),
        )
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let registry = ProposalRegistry::new();
        let session = SessionId::new();
        let proposal = status_change(session);
        let id = proposal.id;

        registry.insert(proposal.clone()).unwrap();
        assert_eq!(
            registry.insert(proposal),
            Err(RegistryError::DuplicateProposal(id))
        );
    }

    #[test]
    fn cross_session_lookup_is_not_found() {
        let registry = ProposalRegistry::new();
        let owner = SessionId::new();
        let stranger = SessionId::new();
        let proposal = status_change(owner);
        let id = proposal.id;
        registry.insert(proposal).unwrap();

        assert!(registry.get(owner, id).is_ok());
        assert_eq!(registry.get(stranger, id), Err(RegistryError::NotFound));
    }

    #[test]
    fn transition_bumps_version_and_rejects_stale() {
        let registry = ProposalRegistry::new();
        let session = SessionId::new();
        let proposal = status_change(session);
        let id = proposal.id;
        registry.insert(proposal).unwrap();

        let updated = registry
            .transition(id, 0, ProposalState::Confirming)
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.state, ProposalState::Confirming);

        // Replaying the same observed version now conflicts
        assert_eq!(
            registry.transition(id, 0, ProposalState::Confirming),
            Err(RegistryError::VersionConflict {
                expected: 0,
                actual: 1
            })
        );
    }

    #[test]
    fn transition_enforces_lifecycle_table() {
        let registry = ProposalRegistry::new();
        let session = SessionId::new();
        let proposal = status_change(session);
        let id = proposal.id;
        registry.insert(proposal).unwrap();

        assert_eq!(
            registry.transition(id, 0, ProposalState::Applied),
            Err(RegistryError::IllegalTransition {
                from: ProposalState::Proposed,
                to: ProposalState::Applied,
            })
        );
    }

    #[test]
    fn concurrent_transitions_have_exactly_one_winner() {
        use std::sync::Arc;

        let registry = Arc::new(ProposalRegistry::new());
        let session = SessionId::new();
        let proposal = status_change(session);
        let id = proposal.id;
        registry.insert(proposal).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.transition(id, 0, ProposalState::Confirming).is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(registry.get(session, id).unwrap().version, 1);
    }

    #[test]
    fn remove_terminal_requires_terminal_state() {
        let registry = ProposalRegistry::new();
        let session = SessionId::new();
        let proposal = status_change(session);
        let id = proposal.id;
        registry.insert(proposal).unwrap();

        assert_eq!(
            registry.remove_terminal(session, id),
            Err(RegistryError::NotTerminal(id))
        );

        registry.transition(id, 0, ProposalState::Rejected).unwrap();
        let removed = registry.remove_terminal(session, id).unwrap();
        assert_eq!(removed.state, ProposalState::Rejected);
        assert_eq!(registry.get(session, id), Err(RegistryError::NotFound));
    }

    #[test]
    fn drop_session_only_touches_owner() {
        let registry = ProposalRegistry::new();
        let a = SessionId::new();
        let b = SessionId::new();
        registry.insert(status_change(a)).unwrap();
        registry.insert(status_change(a)).unwrap();
        registry.insert(status_change(b)).unwrap();

        assert_eq!(registry.drop_session(a), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pending(b).len(), 1);
    }

    proptest::proptest! {
        /// Any interleaving of transition attempts, valid or not, only
        /// ever grows the version, and stale versions never win.
        #[test]
        fn prop_version_never_decreases(
            attempts in proptest::collection::vec((0_u64..4, 0_usize..4), 0..24)
        ) {
            use ProposalState::{Applied, Confirming, Failed, Rejected};

            let registry = ProposalRegistry::new();
            let session = SessionId::new();
            let proposal = status_change(session);
            let id = proposal.id;
            registry.insert(proposal).unwrap();

            let states = [Confirming, Rejected, Applied, Failed];
            let mut last_version = 0;
            for (version, state_idx) in attempts {
                let result = registry.transition(id, version, states[state_idx]);
                let current = registry.get(session, id).unwrap().version;
                proptest::prop_assert!(current >= last_version);
                if version != last_version {
                    proptest::prop_assert_eq!(
                        result,
                        Err(RegistryError::VersionConflict {
                            expected: version,
                            actual: last_version,
                        })
                    );
                }
                last_version = current;
            }
        }
    }

    #[test]
    fn pending_excludes_terminal_proposals() {
        let registry = ProposalRegistry::new();
        let session = SessionId::new();
        let keep = status_change(session);
        let done = status_change(session);
        let done_id = done.id;
        registry.insert(keep.clone()).unwrap();
        registry.insert(done).unwrap();
        registry
            .transition(done_id, 0, ProposalState::Rejected)
            .unwrap();

        let pending = registry.pending(session);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, keep.id);
    }
}
