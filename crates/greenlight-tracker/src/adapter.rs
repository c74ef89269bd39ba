//! Tracker adapter - retry, rate gating, idempotency dispatch
//!
//! The orchestrator hands the adapter a proposal and the derived
//! idempotency key; the adapter picks the tracker operation, layers the
//! retry policy over transient failures, and honors rate-limit signals
//! proactively so a burst of confirms does not turn into a backoff storm.

use crate::client::{
    CreateEntity, IdempotencySupport, MutationKind, MutationOutcome, TrackerClient, UpdateStatus,
};
use crate::error::TrackerError;
use crate::idempotency::IdempotencyKey;
use crate::retry::RetryPolicy;
use greenlight_proposal::{Proposal, ProposalPayload};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of driving one proposal through the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMutation {
    pub outcome: MutationOutcome,
    /// True when the pre-check found the mutation already applied and no
    /// tracker write happened on this call
    pub precheck_hit: bool,
}

/// Earliest-next-call gate fed by rate-limit signals
///
/// Reactive backoff alone lets every queued confirm slam the tracker the
/// moment its own retry timer fires; the gate makes the quota signal
/// shared so subsequent calls delay up front.
#[derive(Debug, Default)]
struct RateGate {
    next_call: Mutex<Option<Instant>>,
}

impl RateGate {
    async fn wait_ready(&self) {
        let wait = {
            let guard = self.next_call.lock();
            guard.and_then(|at| at.checked_duration_since(Instant::now()))
        };
        if let Some(wait) = wait {
            tracing::warn!(delay_ms = wait.as_millis() as u64, "rate gate holding tracker call");
            tokio::time::sleep(wait).await;
        }
    }

    fn hold_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut guard = self.next_call.lock();
        if guard.map_or(true, |existing| existing < until) {
            *guard = Some(until);
        }
    }
}

/// Retrying, rate-aware front to a [`TrackerClient`]
pub struct TrackerAdapter {
    client: Arc<dyn TrackerClient>,
    retry: RetryPolicy,
    gate: RateGate,
}

impl TrackerAdapter {
    /// Wrap a tracker binding with the default retry policy
    #[must_use]
    pub fn new(client: Arc<dyn TrackerClient>) -> Self {
        Self::with_retry_policy(client, RetryPolicy::default())
    }

    /// Wrap a tracker binding with an explicit retry policy
    #[must_use]
    pub fn with_retry_policy(client: Arc<dyn TrackerClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            gate: RateGate::default(),
        }
    }

    /// Read current entity state, with the same retry envelope as writes
    pub async fn fetch(
        &self,
        entity: &greenlight_proposal::EntityRef,
    ) -> Result<crate::client::EntitySnapshot, TrackerError> {
        let mut attempt = 0;
        loop {
            self.gate.wait_ready().await;
            match self.client.fetch(entity).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => self.absorb_or_bail(err, &mut attempt).await?,
            }
        }
    }

    /// Apply a proposal's mutation to the system of record
    ///
    /// Dispatch per payload kind:
    /// - `TaskCreate` -> create entity in its board column
    /// - `StatusChange` -> status update on the explicit target
    /// - `IssueRecommendation` -> comment when it targets an existing
    ///   entity, otherwise a fresh issue
    ///
    /// When the tracker declares no native idempotency for the chosen
    /// operation, a marker pre-check runs first and short-circuits to the
    /// already-created entity. Best effort only: a mutation that landed
    /// without its marker becoming visible yet can still slip through.
    ///
    /// # Errors
    /// The final [`TrackerError`] once retries exhaust, or immediately for
    /// non-transient failures.
    pub async fn apply(
        &self,
        proposal: &Proposal,
        key: &IdempotencyKey,
        etag_hint: Option<&str>,
    ) -> Result<AppliedMutation, TrackerError> {
        let kind = mutation_kind(proposal);

        if self.client.idempotency_support(kind) == IdempotencySupport::None {
            if let Some(existing) = self.find_by_marker(key).await? {
                tracing::debug!(key = %key, external_id = %existing.external_id, "pre-check hit, skipping mutation");
                return Ok(AppliedMutation {
                    outcome: MutationOutcome {
                        external_id: existing.external_id,
                        etag: existing.etag,
                        status: existing.status,
                    },
                    precheck_hit: true,
                });
            }
        }

        let mut attempt = 0;
        loop {
            self.gate.wait_ready().await;
            match self.call_once(proposal, key, etag_hint).await {
                Ok(outcome) => {
                    self.note_quota();
                    return Ok(AppliedMutation {
                        outcome,
                        precheck_hit: false,
                    });
                }
                Err(err) => self.absorb_or_bail(err, &mut attempt).await?,
            }
        }
    }

    /// One raw tracker call, no retry
    async fn call_once(
        &self,
        proposal: &Proposal,
        key: &IdempotencyKey,
        etag_hint: Option<&str>,
    ) -> Result<MutationOutcome, TrackerError> {
        match &proposal.payload {
            ProposalPayload::TaskCreate { title, body, column } => {
                self.client
                    .create_entity(
                        CreateEntity {
                            title: title.clone(),
                            body: body.clone(),
                            labels: Vec::new(),
                            column: Some(column.clone()),
                        },
                        key,
                    )
                    .await
            }
            ProposalPayload::StatusChange { to_status, .. } => {
                let target = proposal
                    .target
                    .as_ref()
                    .ok_or_else(|| TrackerError::Permanent("status change without target".into()))?;
                self.client
                    .update_status(
                        target,
                        UpdateStatus {
                            to_status: to_status.clone(),
                            expected_etag: etag_hint.map(str::to_owned),
                        },
                        key,
                    )
                    .await
            }
            ProposalPayload::IssueRecommendation { title, body, labels } => {
                match &proposal.target {
                    Some(target) => {
                        let comment = format!("{title}\n\n{body}");
                        self.client.add_comment(target, &comment, key).await
                    }
                    None => {
                        self.client
                            .create_entity(
                                CreateEntity {
                                    title: title.clone(),
                                    body: body.clone(),
                                    labels: labels.clone(),
                                    column: None,
                                },
                                key,
                            )
                            .await
                    }
                }
            }
        }
    }

    async fn find_by_marker(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<crate::client::EntitySnapshot>, TrackerError> {
        let mut attempt = 0;
        loop {
            self.gate.wait_ready().await;
            match self.client.find_by_marker(key).await {
                Ok(found) => return Ok(found),
                Err(err) => self.absorb_or_bail(err, &mut attempt).await?,
            }
        }
    }

    /// Sleep out a transient error, or propagate everything else
    async fn absorb_or_bail(
        &self,
        err: TrackerError,
        attempt: &mut u32,
    ) -> Result<(), TrackerError> {
        if !err.is_transient() || *attempt >= self.retry.max_retries {
            return Err(err);
        }
        if let TrackerError::RateLimited {
            retry_after: Some(delay),
        } = &err
        {
            self.gate.hold_for(*delay);
        }
        let delay = self.retry.delay_for(*attempt);
        tracing::warn!(
            attempt = *attempt + 1,
            max = self.retry.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient tracker failure, backing off"
        );
        tokio::time::sleep(delay).await;
        *attempt += 1;
        Ok(())
    }

    /// Feed the tracker's remaining-quota hint into the gate
    fn note_quota(&self) {
        if let Some(quota) = self.client.quota() {
            if quota.remaining == 0 {
                self.gate.hold_for(quota.reset_after);
            }
        }
    }
}

fn mutation_kind(proposal: &Proposal) -> MutationKind {
    match &proposal.payload {
        ProposalPayload::TaskCreate { .. } => MutationKind::CreateEntity,
        ProposalPayload::StatusChange { .. } => MutationKind::UpdateStatus,
        ProposalPayload::IssueRecommendation { .. } => match proposal.target {
            Some(_) => MutationKind::AddComment,
            None => MutationKind::CreateEntity,
        },
    }
}
