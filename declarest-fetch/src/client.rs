//! Drives a [`Requester`] against a transport, one page at a time.

use std::time::Duration;

use declarest_core::PaginationContext;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FetchError, TransportError};
use crate::host::{HttpTransport, ReqwestTransport};
use crate::requester::{Requester, ResponseAction};

/// Sends requests built by a requester and retries transient failures.
///
/// The request is built once per page and re-sent unchanged on every retry.
#[derive(Debug, Clone)]
pub struct RequestClient<T = ReqwestTransport> {
    transport: T,
}

impl RequestClient<ReqwestTransport> {
    /// Creates a client over the default reqwest transport.
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_transport(ReqwestTransport::new()?))
    }
}

impl<T: HttpTransport> RequestClient<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches one page and returns its records.
    pub async fn fetch(
        &self,
        requester: &dyn Requester,
        context: &PaginationContext,
    ) -> Result<Vec<Value>, FetchError> {
        let request = requester.build_request(context);
        let mut retries = 0;

        loop {
            debug!(stream = requester.name(), attempt = retries + 1, "Making request");

            let delay = match self.transport.send(&request).await {
                Ok(response) => match requester.interpret(&response, retries)? {
                    ResponseAction::Records(records) => {
                        debug!(stream = requester.name(), records = records.len(), "Page fetched");
                        return Ok(records);
                    }
                    ResponseAction::Retry(delay) => delay,
                },
                Err(e) => transport_backoff(requester, e, retries)?,
            };

            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

/// Delay before re-sending after a transport failure, or the error to
/// return when the failure is not transient or the budget is spent.
fn transport_backoff(
    requester: &dyn Requester,
    error: TransportError,
    retries: u32,
) -> Result<Duration, FetchError> {
    if !error.is_transient() {
        return Err(error.into());
    }
    if requester.max_retries().is_some_and(|max| retries >= max) {
        return Err(FetchError::TransportRetriesExhausted {
            attempts: retries + 1,
            source: error,
        });
    }

    let delay = requester.retry_policy().delay_for_retry(retries + 1);
    warn!(
        stream = requester.name(),
        error = %error,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        "Request failed, retrying"
    );
    Ok(delay)
}
