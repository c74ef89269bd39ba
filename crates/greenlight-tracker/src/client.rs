//! Tracker client contract
//!
//! The trait every concrete system-of-record binding implements. The
//! orchestrator never talks to a tracker directly; it goes through the
//! [`crate::TrackerAdapter`], which layers retry, rate limiting and
//! idempotency handling on top of these raw operations.

use crate::error::TrackerError;
use crate::idempotency::IdempotencyKey;
use greenlight_proposal::EntityRef;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The mutation classes the engine performs against a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    CreateEntity,
    UpdateStatus,
    AddComment,
}

/// Per-operation idempotency guarantee declared by a tracker binding
///
/// Real trackers differ per mutation type: a create may accept a client
/// mutation token while a status update does not. `None` makes the adapter
/// fall back to a pre-check read, a best-effort (not airtight) guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencySupport {
    /// The tracker deduplicates natively on the supplied key
    Native,
    /// No native support; the adapter pre-checks by marker before mutating
    None,
}

/// Request to create a new entity (task or issue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntity {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    /// Workflow column for board tasks; `None` for plain issues
    pub column: Option<String>,
}

/// Request to move an entity to a new workflow status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub to_status: String,
    /// Version token from the entity cache; trackers that support it
    /// reject the update with `Conflict` when the entity moved meanwhile
    pub expected_etag: Option<String>,
}

/// Result of a successful tracker mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// Identifier the tracker assigned or confirmed
    pub external_id: String,
    pub etag: Option<String>,
    pub status: Option<String>,
}

/// Point-in-time view of a tracker entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub external_id: String,
    pub status: Option<String>,
    pub etag: Option<String>,
}

/// Remaining-quota hint reported by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSignal {
    pub remaining: u32,
    pub reset_after: Duration,
}

/// A binding to the external system of record
///
/// Implementations must be cheap to share (`Arc<dyn TrackerClient>`) and
/// must map their wire errors into the [`TrackerError`] taxonomy; the
/// adapter's retry decisions depend on that classification.
#[async_trait::async_trait]
pub trait TrackerClient: Send + Sync {
    /// Idempotency guarantee for one mutation class
    fn idempotency_support(&self, op: MutationKind) -> IdempotencySupport;

    /// Create a task or issue
    async fn create_entity(
        &self,
        request: CreateEntity,
        key: &IdempotencyKey,
    ) -> Result<MutationOutcome, TrackerError>;

    /// Move an existing entity to a new status
    async fn update_status(
        &self,
        entity: &EntityRef,
        request: UpdateStatus,
        key: &IdempotencyKey,
    ) -> Result<MutationOutcome, TrackerError>;

    /// Attach a comment to an existing entity
    async fn add_comment(
        &self,
        entity: &EntityRef,
        body: &str,
        key: &IdempotencyKey,
    ) -> Result<MutationOutcome, TrackerError>;

    /// Look for an entity already carrying this key's marker
    ///
    /// The pre-check half of the no-native-idempotency fallback.
    async fn find_by_marker(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<EntitySnapshot>, TrackerError>;

    /// Read current entity state (reconciliation and cache refresh)
    async fn fetch(&self, entity: &EntityRef) -> Result<EntitySnapshot, TrackerError>;

    /// Remaining-quota hint, when the tracker exposes one
    fn quota(&self) -> Option<QuotaSignal> {
        None
    }
}
