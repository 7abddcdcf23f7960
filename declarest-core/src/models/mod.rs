//! Data model for the request engine.
//!
//! ## Submodules
//!
//! - [`http`] - HTTP types (HttpMethod, RequestDescriptor, RequestBody, HttpResponse)
//! - [`context`] - Pagination context supplied by the sync loop
//! - [`retry`] - Per-response retry decisions

mod context;
mod http;
mod retry;

pub use context::PaginationContext;
pub use http::{HttpMethod, HttpResponse, RequestBody, RequestDescriptor, join_url};
pub use retry::{GiveUpReason, RetryDecision};
