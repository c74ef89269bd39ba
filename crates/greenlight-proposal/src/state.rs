//! Proposal lifecycle state machine

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a proposal
///
/// `Applied`, `Failed` and `Rejected` are terminal: no transition leads out
/// of them. A user wishing to retry a failed proposal gets a brand-new
/// proposal with a new id from the chat layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Awaiting user decision
    Proposed,
    /// Confirmation accepted; mutation in flight against the tracker
    Confirming,
    /// Mutation applied to the system of record
    Applied,
    /// Mutation failed after exhausting retries, or rejected by the tracker
    Failed,
    /// User declined; no external call was made
    Rejected,
}

impl ProposalState {
    /// Whether this state admits no further transitions
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed | Self::Rejected)
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::Confirming => "confirming",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// States reachable in one transition from `from`
#[must_use]
pub fn allowed_transitions(from: ProposalState) -> Vec<ProposalState> {
    use ProposalState::{Applied, Confirming, Failed, Proposed, Rejected};
    match from {
        Proposed => vec![Confirming, Rejected],
        Confirming => vec![Applied, Failed],
        Applied | Failed | Rejected => vec![],
    }
}

/// Validates a state transition.
///
/// Rejection is only possible while `Proposed`; once `Confirming` the
/// mutation may already be in flight, so there is no cancel path.
pub fn validate_transition(
    from: ProposalState,
    to: ProposalState,
) -> Result<(), RegistryError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(RegistryError::IllegalTransition { from, to })
    }
}

fn allowed(from: ProposalState, to: ProposalState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
