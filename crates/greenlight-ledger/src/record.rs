//! Application records and the ledger contract

use chrono::{DateTime, Utc};
use greenlight_proposal::ProposalId;
use greenlight_tracker::IdempotencyKey;
use serde::{Deserialize, Serialize};

/// What happened when the mutation was driven to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Stable string form used by durable backends
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// One ledger entry: the applied (or failed) mutation of one proposal
///
/// The idempotency key is derived deterministically from the proposal id,
/// so at most one record can ever exist per proposal; a `Success` record
/// is the at-most-once guard the orchestrator's short-circuit relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub idempotency_key: IdempotencyKey,
    pub proposal_id: ProposalId,
    pub outcome: Outcome,
    /// Identifier the tracker returned, when the mutation landed
    pub external_mutation_id: Option<String>,
    pub applied_at: DateTime<Utc>,
    /// Failure classification kept for the audit trail
    pub error_kind: Option<String>,
}

impl ApplicationRecord {
    /// Record a successful application
    #[must_use]
    pub fn success(proposal_id: ProposalId, external_mutation_id: impl Into<String>) -> Self {
        Self {
            idempotency_key: IdempotencyKey::derive(proposal_id),
            proposal_id,
            outcome: Outcome::Success,
            external_mutation_id: Some(external_mutation_id.into()),
            applied_at: Utc::now(),
            error_kind: None,
        }
    }

    /// Record a failed application (audit only; never blocks a new proposal)
    #[must_use]
    pub fn failure(proposal_id: ProposalId, error_kind: impl Into<String>) -> Self {
        Self {
            idempotency_key: IdempotencyKey::derive(proposal_id),
            proposal_id,
            outcome: Outcome::Failure,
            external_mutation_id: None,
            applied_at: Utc::now(),
            error_kind: Some(error_kind.into()),
        }
    }
}

/// Result of [`ApplicationLedger::write_if_absent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteIfAbsent {
    /// False when a record already held the key; `record` is then the
    /// pre-existing one, not the attempted write
    pub inserted: bool,
    pub record: ApplicationRecord,
}

/// Ledger backend failure
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Underlying store failed (I/O, corruption)
    #[error("ledger storage failure: {0}")]
    Storage(String),

    /// A stored row could not be decoded
    #[error("corrupt ledger record for key {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Append-only record store keyed by idempotency key
///
/// `write_if_absent` must be atomic: two racing writers for the same key
/// observe exactly one `inserted: true`, and the loser gets the winner's
/// record back rather than an error.
#[async_trait::async_trait]
pub trait ApplicationLedger: Send + Sync {
    /// Insert unless the key is already present
    async fn write_if_absent(
        &self,
        record: ApplicationRecord,
    ) -> Result<WriteIfAbsent, LedgerError>;

    /// Look up the record for a proposal, if one was ever written
    async fn find_by_proposal(
        &self,
        proposal_id: ProposalId,
    ) -> Result<Option<ApplicationRecord>, LedgerError>;
}
