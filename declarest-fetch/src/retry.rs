//! Default retry policy for HTTP responses.

use std::time::Duration;

use chrono::Utc;
use declarest_core::{HttpResponse, RetryPolicy, exponential_backoff};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default backoff factor in seconds.
pub const DEFAULT_RETRY_FACTOR: f64 = 5.0;

/// Default ceiling for a single backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Retries 429 and 5xx responses with exponential backoff.
///
/// Success is 2xx plus any status in `success_statuses`. Transient is 429,
/// 5xx, plus any status in `retry_statuses`. A `Retry-After` header, when
/// present and honored, replaces the computed delay. Every delay is capped at
/// `max_backoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultRetryPolicy {
    /// Maximum retries after the first attempt. `None` = unlimited.
    pub max_retries: Option<u32>,
    /// Backoff factor in seconds.
    pub retry_factor: f64,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Extra statuses treated as transient.
    pub retry_statuses: Vec<u16>,
    /// Extra statuses treated as success.
    pub success_statuses: Vec<u16>,
    /// Whether to honor `Retry-After`.
    pub respect_retry_after: bool,
    /// Whether non-transient failures are errors.
    pub raise_on_http_errors: bool,
}

impl DefaultRetryPolicy {
    /// Creates a policy with the given retry budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            ..Self::default()
        }
    }

    /// Retries transient responses forever.
    pub fn unlimited() -> Self {
        Self {
            max_retries: None,
            ..Self::default()
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Sets the backoff factor.
    pub fn with_retry_factor(mut self, factor: f64) -> Self {
        self.retry_factor = factor;
        self
    }

    /// Sets the delay ceiling.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Treats an extra status as transient.
    pub fn with_retry_status(mut self, status: u16) -> Self {
        self.retry_statuses.push(status);
        self
    }

    /// Treats an extra status as success.
    pub fn with_success_status(mut self, status: u16) -> Self {
        self.success_statuses.push(status);
        self
    }

    /// Enables or disables honoring `Retry-After`.
    pub fn with_retry_after(mut self, enabled: bool) -> Self {
        self.respect_retry_after = enabled;
        self
    }

    /// Accepts non-transient failures instead of raising them.
    pub fn ignore_http_errors(mut self) -> Self {
        self.raise_on_http_errors = false;
        self
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            retry_factor: DEFAULT_RETRY_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retry_statuses: Vec::new(),
            success_statuses: Vec::new(),
            respect_retry_after: true,
            raise_on_http_errors: true,
        }
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    fn retry_factor(&self) -> f64 {
        self.retry_factor
    }

    fn is_success(&self, response: &HttpResponse) -> bool {
        response.is_success() || self.success_statuses.contains(&response.status)
    }

    fn should_retry(&self, response: &HttpResponse) -> bool {
        if self.is_success(response) {
            return false;
        }
        response.is_rate_limited()
            || response.is_server_error()
            || self.retry_statuses.contains(&response.status)
    }

    fn backoff_time(&self, response: &HttpResponse) -> Option<Duration> {
        if !self.respect_retry_after {
            return None;
        }
        response
            .retry_after(Utc::now())
            .map(|delay| delay.min(self.max_backoff))
    }

    fn raise_on_http_errors(&self) -> bool {
        self.raise_on_http_errors
    }

    fn delay_for_retry(&self, retry: u32) -> Duration {
        exponential_backoff(self.retry_factor, retry).min(self.max_backoff)
    }
}
