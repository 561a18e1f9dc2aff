//! Retry policy for transient link failures.
//!
//! Disconnects with the link-loss status code and silent connection timeouts
//! are retried with a fixed backoff delay. The budget is scoped to one
//! connection attempt sequence: it resets when the session reaches ready and
//! forces a terminal failure when exhausted.
//!
//! The default policy is uncapped, matching the observed behavior of the
//! transport this was built against. That leaves a latent infinite-retry loop
//! against a permanently unreachable peripheral, so the uncapped path logs a
//! warning every [`UNCAPPED_WARN_EVERY`] attempts; set
//! [`RetryPolicy::max_attempts`] to bound it.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// How often the uncapped retry path warns about its own persistence.
pub const UNCAPPED_WARN_EVERY: u32 = 10;

/// Fixed backoff applied before each transient-failure retry.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);

/// Configuration for the transient-failure retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay before each retry.
    pub backoff: Duration,
    /// Maximum retries per attempt sequence; `None` retries without bound.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fixed backoff delay.
    #[must_use]
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap the number of retries per attempt sequence.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Validate the policy and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.backoff.is_zero() {
            return Err(Error::invalid_config("retry backoff must be > 0"));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::invalid_config(
                "max_attempts must be >= 1 when capped",
            ));
        }
        Ok(())
    }
}

/// Attempt counter scoped to one connection attempt sequence.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryBudget {
    /// Create a fresh budget under the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// The fixed backoff delay to wait before the next retry.
    pub fn backoff(&self) -> Duration {
        self.policy.backoff
    }

    /// Retries consumed so far in this sequence.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Try to consume one retry. Returns `false` when the budget is
    /// exhausted and the sequence must fail terminally.
    pub fn try_consume(&mut self) -> bool {
        if let Some(max) = self.policy.max_attempts
            && self.attempts >= max
        {
            return false;
        }
        self.attempts += 1;
        if self.policy.max_attempts.is_none() && self.attempts % UNCAPPED_WARN_EVERY == 0 {
            warn!(
                attempts = self.attempts,
                "uncapped link-loss retry still looping"
            );
        }
        true
    }

    /// Reset the counter; called when the session reaches ready.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
