//! Capability traits consumed by the requester.
//!
//! Each capability has a fixed method set. The concrete implementation is
//! chosen once, when the requester is constructed, and never swapped while a
//! stream is being read. All capabilities are `Send + Sync` so a requester can
//! be shared across tasks.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use serde_json::Value;

use crate::error::DecodeError;
use crate::models::{GiveUpReason, HttpResponse, PaginationContext, RequestDescriptor, RetryDecision};

/// Adds credentials to an outgoing request.
pub trait Authenticator: Debug + Send + Sync {
    /// Returns the request with credentials applied.
    ///
    /// The request is taken by value; the returned descriptor is the one to
    /// send.
    fn apply(&self, request: RequestDescriptor) -> RequestDescriptor;
}

/// Turns a raw response body into records.
pub trait Decoder: Debug + Send + Sync {
    /// Decodes the body of a response.
    ///
    /// Purely structural: no status checks and no retry logic.
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>, DecodeError>;
}

/// Supplies query parameters for a page.
pub trait ParameterProvider: Debug + Send + Sync {
    /// Returns the query parameters for the given pagination context.
    fn params(&self, context: &PaginationContext) -> BTreeMap<String, String>;
}

/// Classifies responses and decides whether and when to retry.
///
/// Implementations hold no per-request state. The caller owns the attempt
/// counter and passes it to [`RetryPolicy::evaluate`].
pub trait RetryPolicy: Debug + Send + Sync {
    /// Maximum number of retries after the first attempt. `None` = unlimited.
    fn max_retries(&self) -> Option<u32>;

    /// Base factor, in seconds, of the exponential backoff.
    fn retry_factor(&self) -> f64;

    /// Returns true if the response counts as a success.
    fn is_success(&self, response: &HttpResponse) -> bool {
        response.is_success()
    }

    /// Returns true if the response is transient and worth retrying.
    ///
    /// Must return false for any response [`RetryPolicy::is_success`] accepts.
    fn should_retry(&self, response: &HttpResponse) -> bool;

    /// A delay dictated by the response itself (e.g. `Retry-After`).
    ///
    /// `None` means the caller should fall back to
    /// [`RetryPolicy::delay_for_retry`].
    fn backoff_time(&self, response: &HttpResponse) -> Option<Duration>;

    /// Whether non-transient failures are surfaced as errors.
    ///
    /// When false they are accepted and passed to the decoder.
    fn raise_on_http_errors(&self) -> bool {
        true
    }

    /// Exponential backoff for the `retry`-th retry (1-based):
    /// `retry_factor * 2^(retry - 1)` seconds.
    fn delay_for_retry(&self, retry: u32) -> Duration {
        exponential_backoff(self.retry_factor(), retry)
    }

    /// Evaluates one response, given how many retries were already made.
    ///
    /// Exhaustion wins over transience: a transient response with no retries
    /// left gives up.
    fn evaluate(&self, response: &HttpResponse, retries_so_far: u32) -> RetryDecision {
        if self.is_success(response) {
            return RetryDecision::Accept;
        }

        if !self.should_retry(response) {
            return if self.raise_on_http_errors() {
                RetryDecision::GiveUp(GiveUpReason::NotRetryable)
            } else {
                RetryDecision::Accept
            };
        }

        if self.max_retries().is_some_and(|max| retries_so_far >= max) {
            return RetryDecision::GiveUp(GiveUpReason::Exhausted);
        }

        let delay = self
            .backoff_time(response)
            .unwrap_or_else(|| self.delay_for_retry(retries_so_far + 1));
        RetryDecision::RetryAfter(delay)
    }
}

/// `retry_factor * 2^(retry - 1)` seconds, saturating at [`Duration::MAX`].
///
/// Non-positive or NaN results yield a zero delay.
pub fn exponential_backoff(retry_factor: f64, retry: u32) -> Duration {
    let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = retry_factor * 2f64.powi(exponent);
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
