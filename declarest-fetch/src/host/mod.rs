//! Host APIs: the I/O the requester itself never performs.
//!
//! - [`http`] - reqwest-backed transport with tracing and domain allowlist

use async_trait::async_trait;
use declarest_core::{HttpResponse, RequestDescriptor};

use crate::error::TransportError;

pub mod http;

pub use http::ReqwestTransport;

/// Sends a resolved request and hands back the raw response.
///
/// Implementations report only transport failures. Any status code,
/// including 4xx and 5xx, is a successful exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request.
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}
