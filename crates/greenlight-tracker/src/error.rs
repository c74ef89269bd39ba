//! Tracker error taxonomy

use std::time::Duration;

/// Typed failure surfaced by the external tracker
///
/// Transient errors are retried inside the adapter and stay invisible to
/// the orchestrator unless retries exhaust; everything else fails the
/// mutation immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// Quota exhausted; the tracker may say when to come back
    #[error("tracker rate limited")]
    RateLimited {
        /// Tracker-supplied earliest retry delay, if any
        retry_after: Option<Duration>,
    },

    /// The entity changed under us (etag/version mismatch)
    #[error("tracker reported a conflicting concurrent mutation")]
    Conflict,

    /// Entity deleted or never existed upstream
    #[error("tracker entity not found")]
    NotFound,

    /// Network / 5xx / timeout class failure, worth retrying
    #[error("transient tracker failure: {0}")]
    Transient(String),

    /// The tracker rejected the mutation outright
    #[error("permanent tracker failure: {0}")]
    Permanent(String),
}

impl TrackerError {
    /// Whether the adapter's retry loop should take another attempt
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}
