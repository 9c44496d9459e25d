//! Reconnection policy for failed long-poll cycles.
//!
//! Classifies each failure as retryable or terminal and chooses the delay
//! before the next attempt. The numeric schedule is configuration, not a
//! constant: callers tune base, cap, jitter, and attempt limit.

use std::time::Duration;

use pw_core::error::PwError;

use crate::events::StatusCategory;

/// Tunable backoff schedule for the subscribe loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// Cap for the exponential delay.
    pub max_delay: Duration,
    /// Maximum consecutive failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(32),
            max_attempts: 0,
            jitter_factor: 0.3,
        }
    }
}

/// Outcome of classifying one failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry transparently; listeners see a transient status only.
    Retry(StatusCategory),
    /// Stop the loop and surface a terminal status once.
    Terminal(StatusCategory),
}

impl ReconnectPolicy {
    /// Decide whether the loop may retry after this failure, and what
    /// status category listeners should see.
    ///
    /// A malformed response fails the single cycle but does not disconnect
    /// the loop; the next request reuses the prior cursor unchanged.
    pub fn classify(&self, error: &PwError) -> RetryDecision {
        match error {
            PwError::Timeout(_) => RetryDecision::Retry(StatusCategory::TimedOut),
            PwError::Network(_) => RetryDecision::Retry(StatusCategory::NetworkIssues),
            PwError::Parsing(_) => RetryDecision::Retry(StatusCategory::MalformedResponse),
            PwError::Server { .. } if error.is_retryable() => {
                RetryDecision::Retry(StatusCategory::NetworkIssues)
            }
            PwError::AccessDenied(_) => RetryDecision::Terminal(StatusCategory::AccessDenied),
            _ => RetryDecision::Terminal(StatusCategory::UnexpectedDisconnect),
        }
    }

    /// Delay before the given attempt, exponential with jitter.
    ///
    /// Sequence: base, 2x, 4x, ... capped at max_delay, with +/-
    /// jitter_factor applied to avoid thundering herd.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponential = (base * 2.0_f64.powi(attempt.min(16) as i32)).min(max);

        let jitter_range = exponential * self.jitter_factor;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        Duration::from_secs_f64((exponential + jitter).max(0.5))
    }

    /// Whether the attempt counter has exhausted this policy.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt > self.max_attempts
    }
}
