//! The workflow orchestrator
//!
//! One `WorkflowEngine` serves every chat session. Proposals come in from
//! the gateway via [`WorkflowEngine::propose`]; user decisions arrive as
//! [`WorkflowEngine::confirm`] / [`WorkflowEngine::reject`]; lifecycle
//! events flow back through the returned value and the broadcast channel.
//!
//! Correctness rests on three mechanisms, in order:
//! 1. the registry's compare-and-set transition (per-proposal safety),
//! 2. the per-target-entity lock table (per-entity total order),
//! 3. the ledger's write-if-absent keyed by the derived idempotency key
//!    (at-most-once application across redeliveries and restarts).

use crate::cache::EntityCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::{ErrorKind, LifecycleEvent};
use crate::locks::LockTable;
use greenlight_ledger::{ApplicationLedger, ApplicationRecord, Outcome};
use greenlight_proposal::{
    EntityRef, ExternalEntityRecord, Proposal, ProposalId, ProposalPayload, ProposalRegistry,
    ProposalState, SessionId,
};
use greenlight_tracker::{IdempotencyKey, TrackerAdapter, TrackerClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

pub(crate) struct Inner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: ProposalRegistry,
    pub(crate) adapter: TrackerAdapter,
    pub(crate) ledger: Arc<dyn ApplicationLedger>,
    pub(crate) locks: LockTable,
    pub(crate) cache: EntityCache,
    pub(crate) events: broadcast::Sender<LifecycleEvent>,
}

/// The confirmation workflow orchestrator
///
/// Cheap to clone; clones share the registry, cache, lock table and event
/// channel.
#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) inner: Arc<Inner>,
}

impl WorkflowEngine {
    /// Build an engine over a tracker binding and a ledger
    #[must_use]
    pub fn new(
        config: EngineConfig,
        tracker: Arc<dyn TrackerClient>,
        ledger: Arc<dyn ApplicationLedger>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let adapter = TrackerAdapter::with_retry_policy(tracker, config.retry);
        Self {
            inner: Arc::new(Inner {
                config,
                registry: ProposalRegistry::new(),
                adapter,
                ledger,
                locks: LockTable::new(),
                cache: EntityCache::new(),
                events,
            }),
        }
    }

    /// Register an AI-emitted proposal for its owning session
    ///
    /// Only the cheap shape check runs here (a status change must carry a
    /// target); the workflow-mapping validation runs at confirm time, when
    /// the mapping that matters is the current one.
    ///
    /// # Errors
    /// `Validation` for a targetless status change, `Registry` on id
    /// collision.
    pub fn propose(
        &self,
        session: SessionId,
        payload: ProposalPayload,
        target: Option<EntityRef>,
    ) -> Result<Proposal, EngineError> {
        if payload.requires_target() && target.is_none() {
            return Err(EngineError::Validation(
                "status change requires a target entity".into(),
            ));
        }
        let proposal = Proposal::new(session, payload, target);
        self.inner.registry.insert(proposal.clone())?;
        tracing::info!(id = %proposal.id, kind = proposal.payload.kind(), "proposal pending");
        self.inner
            .send_event(LifecycleEvent::state_only(proposal.id, ProposalState::Proposed));
        Ok(proposal)
    }

    /// Confirm a proposal, waiting up to the configured budget
    ///
    /// See [`Self::confirm_within`].
    ///
    /// # Errors
    /// As for [`Self::confirm_within`].
    pub async fn confirm(
        &self,
        session: SessionId,
        id: ProposalId,
        observed_version: u64,
    ) -> Result<LifecycleEvent, EngineError> {
        let wait = self.inner.config.confirm_timeout;
        self.confirm_within(session, id, observed_version, wait).await
    }

    /// Confirm a proposal with an explicit wait budget
    ///
    /// Idempotent under redelivery: when a prior confirm already applied
    /// this proposal, the recorded outcome comes back without another
    /// tracker call. Otherwise the proposal moves `Proposed -> Confirming`
    /// under compare-and-set, and the mutation is driven behind the
    /// target's serialization lock in a spawned task.
    ///
    /// If the task does not finish within `wait`, the caller gets a
    /// `Confirming` event; the proposal stays `Confirming` server-side,
    /// the lock stays held by the in-flight task, and the terminal event
    /// arrives on [`Self::subscribe`]. A timed-out confirm must be polled
    /// or observed, never assumed failed.
    ///
    /// # Errors
    /// `Registry(NotFound)` for unknown/foreign proposals,
    /// `Registry(VersionConflict)` when `observed_version` is stale (the
    /// caller must re-fetch before deciding anything),
    /// `Registry(IllegalTransition)` for terminal or already-confirming
    /// proposals, `Validation` when the payload fails the workflow
    /// mapping (the proposal stays `Proposed`).
    pub async fn confirm_within(
        &self,
        session: SessionId,
        id: ProposalId,
        observed_version: u64,
        wait: Duration,
    ) -> Result<LifecycleEvent, EngineError> {
        let inner = &self.inner;
        let proposal = inner.registry.get(session, id)?;

        // Redelivered confirm after a recorded success: short-circuit
        // without touching the tracker.
        if let Some(record) = inner.ledger.find_by_proposal(id).await? {
            if record.outcome == Outcome::Success {
                tracing::debug!(id = %id, "confirm short-circuited by ledger record");
                return Ok(LifecycleEvent {
                    proposal_id: id,
                    state: ProposalState::Applied,
                    applied_entity_id: record.external_mutation_id,
                    error_kind: None,
                });
            }
        }

        validate_payload(&inner.config, &proposal)?;

        let confirming = inner
            .registry
            .transition(id, observed_version, ProposalState::Confirming)?;
        inner.send_event(LifecycleEvent::state_only(id, ProposalState::Confirming));

        let (done_tx, done_rx) = oneshot::channel();
        let driver = Arc::clone(inner);
        tokio::spawn(async move {
            let event = driver.drive(confirming).await;
            // Receiver gone means the caller timed out; subscribers still
            // got the terminal event.
            let _ = done_tx.send(event);
        });

        match tokio::time::timeout(wait, done_rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(id = %id, wait_ms = wait.as_millis() as u64, "confirm wait elapsed, mutation still in flight");
                Ok(LifecycleEvent::state_only(id, ProposalState::Confirming))
            }
        }
    }

    /// Reject a pending proposal
    ///
    /// Valid only while `Proposed`: once `Confirming` has begun the
    /// mutation may already be in flight and there is no cancel path.
    ///
    /// # Errors
    /// `Registry(NotFound)`, `Registry(VersionConflict)` for stale views,
    /// `Registry(IllegalTransition)` once confirmation has begun or the
    /// proposal is terminal.
    pub fn reject(
        &self,
        session: SessionId,
        id: ProposalId,
        observed_version: u64,
    ) -> Result<LifecycleEvent, EngineError> {
        self.inner.registry.get(session, id)?;
        self.inner
            .registry
            .transition(id, observed_version, ProposalState::Rejected)?;
        tracing::info!(id = %id, "proposal rejected");
        let event = LifecycleEvent::state_only(id, ProposalState::Rejected);
        self.inner.send_event(event.clone());
        Ok(event)
    }

    /// Drop a terminal proposal from the registry (user dismissed it)
    ///
    /// # Errors
    /// `Registry(NotTerminal)` while the proposal is still live,
    /// `Registry(NotFound)` for unknown/foreign ids.
    pub fn dismiss(&self, session: SessionId, id: ProposalId) -> Result<(), EngineError> {
        self.inner.registry.remove_terminal(session, id)?;
        Ok(())
    }

    /// Drop every proposal a session owns (session ended)
    pub fn end_session(&self, session: SessionId) -> usize {
        let dropped = self.inner.registry.drop_session(session);
        if dropped > 0 {
            tracing::debug!(%session, dropped, "session proposals dropped");
        }
        dropped
    }

    /// Re-fetch one proposal (stale-view recovery)
    ///
    /// # Errors
    /// `Registry(NotFound)` for unknown/foreign ids.
    pub fn proposal(&self, session: SessionId, id: ProposalId) -> Result<Proposal, EngineError> {
        Ok(self.inner.registry.get(session, id)?)
    }

    /// A session's non-terminal proposals, for UI re-render
    #[must_use]
    pub fn pending(&self, session: SessionId) -> Vec<Proposal> {
        self.inner.registry.pending(session)
    }

    /// Subscribe to lifecycle events (terminal events after a confirm
    /// timeout arrive here)
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Cached shadow of a tracker entity, if the engine has seen it
    #[must_use]
    pub fn entity_snapshot(&self, external_id: &str) -> Option<ExternalEntityRecord> {
        self.inner.cache.get(external_id)
    }
}

impl Inner {
    /// Drive a `Confirming` proposal to its terminal state
    ///
    /// Runs in a spawned task, entirely behind the proposal's entity lock.
    async fn drive(&self, proposal: Proposal) -> LifecycleEvent {
        let key = IdempotencyKey::derive(proposal.id);
        let lock_key = proposal.lock_key();
        let _guard = self.locks.acquire(&lock_key.external_id).await;

        // Re-check under the lock: a confirm queued behind the winner for
        // this entity must not re-apply an already-recorded proposal.
        match self.ledger.find_by_proposal(proposal.id).await {
            Ok(Some(record)) if record.outcome == Outcome::Success => {
                let event = LifecycleEvent {
                    proposal_id: proposal.id,
                    state: ProposalState::Applied,
                    applied_entity_id: record.external_mutation_id,
                    error_kind: None,
                };
                self.complete(&proposal, ProposalState::Applied);
                self.send_event(event.clone());
                return event;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(id = %proposal.id, error = %err, "ledger read failed under entity lock");
            }
        }

        let etag_hint = proposal
            .target
            .as_ref()
            .and_then(|t| self.cache.get(&t.external_id))
            .and_then(|r| r.etag);

        let event = match self.adapter.apply(&proposal, &key, etag_hint.as_deref()).await {
            Ok(applied) => {
                if applied.precheck_hit {
                    tracing::info!(id = %proposal.id, "mutation already present upstream, adopted via pre-check");
                }
                let record =
                    ApplicationRecord::success(proposal.id, applied.outcome.external_id.clone());
                if let Err(err) = self.ledger.write_if_absent(record).await {
                    // The mutation landed; losing the record degrades the
                    // short-circuit to the tracker-side idempotency key.
                    tracing::error!(id = %proposal.id, error = %err, "ledger write failed after applied mutation");
                }
                self.cache.apply_outcome(&applied.outcome);
                self.complete(&proposal, ProposalState::Applied);
                tracing::info!(id = %proposal.id, external_id = %applied.outcome.external_id, "proposal applied");
                LifecycleEvent::applied(proposal.id, applied.outcome.external_id)
            }
            Err(err) => {
                let kind = ErrorKind::from_tracker(&err);
                let record = ApplicationRecord::failure(proposal.id, kind.as_str());
                if let Err(write_err) = self.ledger.write_if_absent(record).await {
                    tracing::error!(id = %proposal.id, error = %write_err, "ledger write failed for failure record");
                }
                self.complete(&proposal, ProposalState::Failed);
                tracing::info!(id = %proposal.id, error = %err, "proposal failed terminally");
                LifecycleEvent::failed(proposal.id, kind)
            }
        };
        self.send_event(event.clone());
        event
    }

    /// Terminal transition out of `Confirming`
    ///
    /// Nothing else transitions a `Confirming` proposal, so a failure here
    /// means the registry entry vanished (session ended mid-flight); the
    /// ledger record already holds the truth either way.
    fn complete(&self, proposal: &Proposal, state: ProposalState) {
        if let Err(err) = self.registry.transition(proposal.id, proposal.version, state) {
            tracing::warn!(id = %proposal.id, error = %err, "terminal transition skipped");
        }
    }

    fn send_event(&self, event: LifecycleEvent) {
        // A send error only means no gateway is subscribed right now.
        let _ = self.events.send(event);
    }
}

/// Kind-specific payload validation against the workflow mapping
fn validate_payload(config: &EngineConfig, proposal: &Proposal) -> Result<(), EngineError> {
    match &proposal.payload {
        ProposalPayload::TaskCreate { title, column, .. } => {
            if title.trim().is_empty() {
                return Err(EngineError::Validation("task title is empty".into()));
            }
            if !config.knows_status(column) {
                return Err(EngineError::Validation(format!(
                    "unknown workflow column {column:?}"
                )));
            }
        }
        ProposalPayload::StatusChange { to_status, .. } => {
            if proposal.target.is_none() {
                return Err(EngineError::Validation(
                    "status change requires a target entity".into(),
                ));
            }
            if !config.knows_status(to_status) {
                return Err(EngineError::Validation(format!(
                    "unknown workflow status {to_status:?}"
                )));
            }
        }
        ProposalPayload::IssueRecommendation { title, .. } => {
            if title.trim().is_empty() {
                return Err(EngineError::Validation("issue title is empty".into()));
            }
        }
    }
    Ok(())
}
