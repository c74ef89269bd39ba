//! Engine error surface

use greenlight_ledger::LedgerError;
use greenlight_proposal::RegistryError;

/// Errors returned to the gateway from the confirm/reject protocol
///
/// Tracker failures are not here: they surface as the `Failed` terminal
/// state carried in the lifecycle event, because by the time the tracker
/// is involved the call has been accepted. Nothing in this taxonomy is
/// fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Payload fails kind-specific validation against the workflow mapping
    #[error("validation failed: {0}")]
    Validation(String),

    /// Registry-level failure: unknown/foreign proposal, stale version,
    /// or an off-table transition
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Durable ledger failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl EngineError {
    /// Whether the caller should re-fetch state before deciding to retry
    #[must_use]
    pub const fn is_stale_view(&self) -> bool {
        matches!(
            self,
            Self::Registry(
                RegistryError::VersionConflict { .. } | RegistryError::IllegalTransition { .. }
            )
        )
    }
}
