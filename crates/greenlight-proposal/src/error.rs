//! Error types for the proposal registry

use crate::state::ProposalState;
use crate::types::ProposalId;

/// Registry error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A proposal with this id is already registered
    #[error("duplicate proposal: {0}")]
    DuplicateProposal(ProposalId),

    /// Unknown id, or a proposal owned by another session
    ///
    /// Cross-session lookups deliberately collapse into this variant so
    /// that existence of foreign proposals never leaks.
    #[error("proposal not found")]
    NotFound,

    /// The caller's observed version is stale
    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// The requested transition is off the lifecycle table
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        from: ProposalState,
        to: ProposalState,
    },

    /// Removal requested for a proposal that has not finished
    #[error("proposal {0} is not in a terminal state")]
    NotTerminal(ProposalId),
}
