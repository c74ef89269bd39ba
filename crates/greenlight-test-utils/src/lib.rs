//! Test utilities for the Greenlight workspace
//!
//! [`ScriptedTracker`] is an in-memory system of record for driving the
//! engine in tests: it counts every mutation call, can be scripted to fail
//! the next N calls, simulates latency for in-flight windows, and honors
//! idempotency markers so the pre-check fallback is exercisable.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use dashmap::DashMap;
use greenlight_proposal::EntityRef;
use greenlight_tracker::{
    CreateEntity, EntitySnapshot, IdempotencyKey, IdempotencySupport, MutationKind,
    MutationOutcome, TrackerClient, TrackerError, UpdateStatus,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// In-memory tracker fake with scripted failures and call counters
#[derive(Default)]
pub struct ScriptedTracker {
    next_id: AtomicU64,
    entities: DashMap<String, EntitySnapshot>,
    /// Idempotency marker -> entity id, the dedup index a real tracker
    /// would keep server-side
    markers: DashMap<String, String>,
    support: Mutex<HashMap<MutationKind, IdempotencySupport>>,
    /// Errors returned by upcoming mutation calls, front first
    scripted_failures: Mutex<VecDeque<TrackerError>>,
    latency: Mutex<Option<Duration>>,
    create_calls: AtomicU32,
    update_calls: AtomicU32,
    comment_calls: AtomicU32,
}

impl ScriptedTracker {
    /// Tracker with native idempotency for every operation and no latency
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an entity, as if another actor created it
    pub fn seed_entity(&self, external_id: &str, status: &str) {
        self.entities.insert(
            external_id.to_owned(),
            EntitySnapshot {
                external_id: external_id.to_owned(),
                status: Some(status.to_owned()),
                etag: Some("e1".to_owned()),
            },
        );
    }

    /// Pre-populate an idempotency marker pointing at an existing entity
    pub fn seed_marker(&self, key: &IdempotencyKey, external_id: &str) {
        self.markers
            .insert(key.as_str().to_owned(), external_id.to_owned());
    }

    /// Declare the idempotency support for one mutation class
    pub fn set_support(&self, op: MutationKind, support: IdempotencySupport) {
        self.support.lock().insert(op, support);
    }

    /// Fail the next mutation calls with these errors, in order
    pub fn script_failures(&self, errors: impl IntoIterator<Item = TrackerError>) {
        self.scripted_failures.lock().extend(errors);
    }

    /// Sleep this long inside every mutation call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Mutation calls seen so far, across all operations
    #[must_use]
    pub fn mutation_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.comment_calls.load(Ordering::SeqCst)
    }

    /// Current status of an entity, as the tracker sees it
    #[must_use]
    pub fn entity_status(&self, external_id: &str) -> Option<String> {
        self.entities
            .get(external_id)
            .and_then(|e| e.status.clone())
    }

    async fn enter_mutation(&self, counter: &AtomicU32) -> Result<(), TrackerError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.scripted_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(())
    }

    fn bump_etag(current: Option<&str>) -> String {
        let n: u64 = current
            .and_then(|e| e.strip_prefix('e'))
            .and_then(|n| n.parse().ok())
            .unwrap_or(1);
        format!("e{}", n + 1)
    }
}

#[async_trait::async_trait]
impl TrackerClient for ScriptedTracker {
    fn idempotency_support(&self, op: MutationKind) -> IdempotencySupport {
        self.support
            .lock()
            .get(&op)
            .copied()
            .unwrap_or(IdempotencySupport::Native)
    }

    async fn create_entity(
        &self,
        request: CreateEntity,
        key: &IdempotencyKey,
    ) -> Result<MutationOutcome, TrackerError> {
        self.enter_mutation(&self.create_calls).await?;

        // Native dedup: a repeated key returns the original entity.
        if let Some(existing) = self.markers.get(key.as_str()) {
            let snapshot = self
                .entities
                .get(existing.value())
                .map(|e| e.clone())
                .ok_or(TrackerError::NotFound)?;
            return Ok(MutationOutcome {
                external_id: snapshot.external_id,
                etag: snapshot.etag,
                status: snapshot.status,
            });
        }

        let external_id = format!("trk-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let snapshot = EntitySnapshot {
            external_id: external_id.clone(),
            status: request.column.clone(),
            etag: Some("e1".to_owned()),
        };
        self.entities.insert(external_id.clone(), snapshot.clone());
        self.markers
            .insert(key.as_str().to_owned(), external_id.clone());
        Ok(MutationOutcome {
            external_id,
            etag: snapshot.etag,
            status: snapshot.status,
        })
    }

    async fn update_status(
        &self,
        entity: &EntityRef,
        request: UpdateStatus,
        key: &IdempotencyKey,
    ) -> Result<MutationOutcome, TrackerError> {
        self.enter_mutation(&self.update_calls).await?;

        let mut stored = self
            .entities
            .get_mut(&entity.external_id)
            .ok_or(TrackerError::NotFound)?;
        if let (Some(expected), Some(actual)) = (&request.expected_etag, &stored.etag) {
            if expected != actual {
                return Err(TrackerError::Conflict);
            }
        }
        stored.status = Some(request.to_status.clone());
        stored.etag = Some(Self::bump_etag(stored.etag.as_deref()));
        self.markers
            .insert(key.as_str().to_owned(), entity.external_id.clone());
        Ok(MutationOutcome {
            external_id: entity.external_id.clone(),
            etag: stored.etag.clone(),
            status: stored.status.clone(),
        })
    }

    async fn add_comment(
        &self,
        entity: &EntityRef,
        _body: &str,
        key: &IdempotencyKey,
    ) -> Result<MutationOutcome, TrackerError> {
        self.enter_mutation(&self.comment_calls).await?;

        let stored = self
            .entities
            .get(&entity.external_id)
            .ok_or(TrackerError::NotFound)?;
        self.markers
            .insert(key.as_str().to_owned(), entity.external_id.clone());
        Ok(MutationOutcome {
            external_id: stored.external_id.clone(),
            etag: stored.etag.clone(),
            status: stored.status.clone(),
        })
    }

    async fn find_by_marker(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<EntitySnapshot>, TrackerError> {
        let Some(external_id) = self.markers.get(key.as_str()) else {
            return Ok(None);
        };
        Ok(self.entities.get(external_id.value()).map(|e| e.clone()))
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<EntitySnapshot, TrackerError> {
        self.entities
            .get(&entity.external_id)
            .map(|e| e.clone())
            .ok_or(TrackerError::NotFound)
    }
}

/// Shorthand payload builders for tests
pub mod payloads {
    use greenlight_proposal::ProposalPayload;

    /// Task-create payload on a board column
    #[must_use]
    pub fn task_create(title: &str, column: &str) -> ProposalPayload {
        ProposalPayload::TaskCreate {
            title: title.to_owned(),
            body: String::new(),
            column: column.to_owned(),
        }
    }

    /// Status-change payload
    #[must_use]
    pub fn status_change(to_status: &str) -> ProposalPayload {
        ProposalPayload::StatusChange {
            from_status: None,
            to_status: to_status.to_owned(),
        }
    }

    /// Issue-recommendation payload
    #[must_use]
    pub fn issue_recommendation(title: &str) -> ProposalPayload {
        ProposalPayload::IssueRecommendation {
            title: title.to_owned(),
            body: String::new(),
            labels: Vec::new(),
        }
    }
}
