//! Bounded exponential backoff policy

use std::time::Duration;

/// Retry policy for transient tracker failures
///
/// Defaults: 3 retries, 500ms base, factor 2, ±20% jitter. Non-transient
/// errors never consult this policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first call. Default: 3
    pub max_retries: u32,
    /// Delay before the first retry. Default: 500ms
    pub base: Duration,
    /// Geometric growth per attempt. Default: 2.0
    pub factor: f64,
    /// Symmetric jitter fraction applied to each delay. Default: 0.2
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(500),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps, for tests that drive time themselves
    #[must_use]
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// Backoff delay before retry number `attempt` (0-based), jittered
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let exp = self.base.as_secs_f64() * self.factor.powi(attempt.min(16) as i32);
        let jittered = if self.jitter > 0.0 {
            let scale: f64 = rand::rng().random_range(-self.jitter..=self.jitter);
            exp * (1.0 + scale)
        } else {
            exp
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}
