//! Engine configuration

use greenlight_tracker::RetryPolicy;
use std::time::Duration;

/// Workflow engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ordered workflow status columns; the mapping StatusChange payloads
    /// validate against
    pub statuses: Vec<String>,
    /// How long a confirm call waits for its terminal event before
    /// returning `Confirming` to the caller
    pub confirm_timeout: Duration,
    /// Interval for the entity-cache reconciliation loop
    pub reconcile_interval: Duration,
    /// Lifecycle broadcast channel capacity
    pub event_capacity: usize,
    /// Retry policy handed to the tracker adapter
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Defaults: Todo / In Progress / Done workflow, 30s confirm wait,
    /// 60s reconciliation
    #[must_use]
    pub fn new() -> Self {
        Self {
            statuses: vec!["Todo".into(), "In Progress".into(), "Done".into()],
            confirm_timeout: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(60),
            event_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the workflow status mapping
    #[must_use]
    pub fn with_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Set the confirm wait budget
    #[must_use]
    pub const fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Set the reconciliation interval
    #[must_use]
    pub const fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Set the adapter retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether a status value exists in the configured workflow
    #[must_use]
    pub fn knows_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
