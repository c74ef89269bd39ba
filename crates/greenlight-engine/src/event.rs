//! Lifecycle events pushed back to the chat gateway

use greenlight_proposal::{ProposalId, ProposalState};
use greenlight_tracker::TrackerError;
use serde::{Deserialize, Serialize};

/// Failure classification surfaced to the UI layer
///
/// Closed taxonomy: internal identifiers and tracker wire details never
/// cross this boundary, only the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload rejected against the workflow mapping
    Validation,
    /// The client's observed version was stale
    VersionConflict,
    /// Unknown or foreign-session proposal
    NotFound,
    /// The tracker rejected the mutation outright
    TrackerPermanent,
    /// Transient tracker failures exhausted the retry budget
    TrackerExhausted,
}

impl ErrorKind {
    /// Classify the error the adapter gave up with
    #[must_use]
    pub const fn from_tracker(err: &TrackerError) -> Self {
        match err {
            TrackerError::RateLimited { .. } | TrackerError::Transient(_) => Self::TrackerExhausted,
            TrackerError::Conflict | TrackerError::NotFound | TrackerError::Permanent(_) => {
                Self::TrackerPermanent
            }
        }
    }

    /// Stable string form, used in ledger audit rows
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::VersionConflict => "version_conflict",
            Self::NotFound => "not_found",
            Self::TrackerPermanent => "tracker_permanent",
            Self::TrackerExhausted => "tracker_exhausted",
        }
    }
}

/// One observable step of a proposal's lifecycle
///
/// Returned from confirm/reject calls and pushed on the engine's broadcast
/// channel so the UI can render transitions it did not initiate (timeouts,
/// session reconnects).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub proposal_id: ProposalId,
    pub state: ProposalState,
    /// Tracker-side id of the applied mutation, present on `Applied`
    pub applied_entity_id: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl LifecycleEvent {
    /// Event for a non-failure state
    #[must_use]
    pub const fn state_only(proposal_id: ProposalId, state: ProposalState) -> Self {
        Self {
            proposal_id,
            state,
            applied_entity_id: None,
            error_kind: None,
        }
    }

    /// Event for a successfully applied mutation
    #[must_use]
    pub fn applied(proposal_id: ProposalId, applied_entity_id: impl Into<String>) -> Self {
        Self {
            proposal_id,
            state: ProposalState::Applied,
            applied_entity_id: Some(applied_entity_id.into()),
            error_kind: None,
        }
    }

    /// Event for a terminal failure
    #[must_use]
    pub const fn failed(proposal_id: ProposalId, kind: ErrorKind) -> Self {
        Self {
            proposal_id,
            state: ProposalState::Failed,
            applied_entity_id: None,
            error_kind: Some(kind),
        }
    }
}
