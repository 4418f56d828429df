//! Retry policy and the per-call state machine.

use std::time::Duration;

use crate::response::Classification;

/// Retry policy of one call.
///
/// A call makes at most `max_retries + 1` attempts, sleeping `delay` between
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Constant delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            delay: crate::config::DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Create a policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Upper bound on attempts.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn has_remaining(&self, attempt: u32) -> bool {
        attempt < self.total_attempts()
    }

    /// Decide where a call goes after attempt number `attempt` ended with
    /// `outcome`.
    pub fn next_state(&self, attempt: u32, outcome: AttemptOutcome) -> CallState {
        let retry_or_fail = || {
            if self.has_remaining(attempt) {
                CallState::RetryWait
            } else {
                CallState::Failed
            }
        };

        match outcome {
            AttemptOutcome::TimedOut | AttemptOutcome::TransportFailed => retry_or_fail(),
            AttemptOutcome::Status(Classification::AuthRequired) => CallState::AuthRefresh,
            AttemptOutcome::Status(Classification::Success) => CallState::Success,
            AttemptOutcome::Status(Classification::Retryable) if self.has_remaining(attempt) => {
                CallState::RetryWait
            }
            AttemptOutcome::Status(Classification::Terminal) => CallState::Failed,
            AttemptOutcome::Status(Classification::Retryable | Classification::Unclassified) => {
                retry_or_fail()
            }
        }
    }

    /// Sleep for the configured delay.
    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt exceeded its deadline.
    TimedOut,
    /// The transport failed before any response.
    TransportFailed,
    /// A response arrived and was classified.
    Status(Classification),
}

/// States of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Sending an attempt.
    Attempt,
    /// A success response is being decoded.
    Success,
    /// Sleeping before the next attempt.
    RetryWait,
    /// Running the authentication hook.
    AuthRefresh,
    /// Giving up.
    Failed,
}
