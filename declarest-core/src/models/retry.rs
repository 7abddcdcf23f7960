//! Retry decisions.

use std::time::Duration;

/// The outcome of evaluating one HTTP exchange against a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The response is final; hand it to the decoder.
    Accept,
    /// Wait for the delay, then re-send the same request.
    RetryAfter(Duration),
    /// Stop and surface a terminal failure.
    GiveUp(GiveUpReason),
}

/// Why a policy gave up on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The response is a non-transient failure.
    NotRetryable,
    /// The response is transient but the retry budget is spent.
    Exhausted,
}

impl RetryDecision {
    /// Returns the delay if this decision is a retry.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::RetryAfter(delay) => Some(*delay),
            _ => None,
        }
    }

    /// Returns true if the caller should re-send the request.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::RetryAfter(_))
    }
}
