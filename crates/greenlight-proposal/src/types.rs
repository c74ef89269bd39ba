//! Core types for the proposal model
//!
//! Defines the fundamental types of the confirmation workflow:
//! - Proposal and session identifiers
//! - External entity references (the serialization-lock key)
//! - The tagged payload union
//! - The proposal entity itself

use crate::state::ProposalState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique proposal identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub Ulid);

impl ProposalId {
    /// Generate new proposal ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProposalId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ulid>().map(Self)
    }
}

/// Unique chat-session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an entity in the external tracker
///
/// Equality and hashing go through the string key, which doubles as the
/// serialization-lock key. For create-style proposals with no existing
/// entity, [`EntityRef::create_scope`] builds a synthetic key covering the
/// logical target ("new issue in repo X") so that concurrent creates into
/// the same scope still serialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Tracker-side identifier, or a synthetic scope key for creates
    pub external_id: String,
}

impl EntityRef {
    /// Reference an existing tracker entity
    #[inline]
    #[must_use]
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
        }
    }

    /// Synthetic lock key for a create targeting a logical scope
    #[must_use]
    pub fn create_scope(scope: &str) -> Self {
        Self {
            external_id: format!("create:{scope}"),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.external_id)
    }
}

/// Kind-specific proposal content, immutable after creation
///
/// Dispatched by pattern matching everywhere; no field-presence checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalPayload {
    /// Create a new task on a board column
    TaskCreate {
        title: String,
        body: String,
        /// Workflow column the task lands in
        column: String,
    },
    /// Move an existing entity to a new workflow status
    StatusChange {
        /// Status the client last observed, if any
        from_status: Option<String>,
        to_status: String,
    },
    /// Recommend opening a new issue
    IssueRecommendation {
        title: String,
        body: String,
        labels: Vec<String>,
    },
}

impl ProposalPayload {
    /// Human-readable kind name, used in events and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskCreate { .. } => "task_create",
            Self::StatusChange { .. } => "status_change",
            Self::IssueRecommendation { .. } => "issue_recommendation",
        }
    }

    /// Whether this payload mutates an existing entity (target required)
    #[must_use]
    pub const fn requires_target(&self) -> bool {
        matches!(self, Self::StatusChange { .. })
    }
}

/// A pending AI-suggested mutation awaiting user confirmation
///
/// `payload` and `target` are immutable after creation; only `state`,
/// `version` and `last_transition_at` change, and only through the
/// registry's compare-and-set transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    /// Owning chat session; proposals are never visible outside it
    pub session: SessionId,
    pub payload: ProposalPayload,
    /// External entity this proposal mutates (None for creates)
    pub target: Option<EntityRef>,
    pub state: ProposalState,
    /// Incremented on every transition; optimistic-concurrency token
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
}

impl Proposal {
    /// Create a new proposal in `Proposed` at version 0
    #[must_use]
    pub fn new(session: SessionId, payload: ProposalPayload, target: Option<EntityRef>) -> Self {
        let now = Utc::now();
        Self {
            id: ProposalId::new(),
            session,
            payload,
            target,
            state: ProposalState::Proposed,
            version: 0,
            created_at: now,
            last_transition_at: now,
        }
    }

    /// Key under which this proposal's mutation serializes
    ///
    /// The explicit target when one exists, else a synthetic scope key
    /// derived from the payload kind, so concurrent creates into the same
    /// scope never interleave.
    #[must_use]
    pub fn lock_key(&self) -> EntityRef {
        match &self.target {
            Some(target) => target.clone(),
            None => match &self.payload {
                ProposalPayload::TaskCreate { column, .. } => {
                    EntityRef::create_scope(&format!("task:{column}"))
                }
                ProposalPayload::IssueRecommendation { .. } => EntityRef::create_scope("issue"),
                // requires_target() rules this arm out at validation time
                ProposalPayload::StatusChange { .. } => EntityRef::create_scope("status"),
            },
        }
    }

    /// Whether the proposal is in a terminal state
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Cached shadow of an entity in the external tracker
///
/// Zero or more proposals may reference one record as their target; the
/// orchestrator refreshes it after each applied mutation and from the
/// periodic reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEntityRecord {
    pub external_id: String,
    pub last_known_status: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    /// Version token supplied by the tracker, if it has one
    pub etag: Option<String>,
}
