//! Pagination context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `(stream_state, stream_slice, next_page_token)` triple for one page.
///
/// All three values are opaque. The requester only hands them to templates
/// and to the parameter provider; it never interprets their shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationContext {
    /// State persisted by the sync loop between runs.
    #[serde(default)]
    pub stream_state: Value,
    /// The slice being synced.
    #[serde(default)]
    pub stream_slice: Value,
    /// Token for the next page, absent on the first page of a slice.
    #[serde(default)]
    pub next_page_token: Option<Value>,
}

impl PaginationContext {
    /// Creates an empty context (first page, no state, no slice).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stream state.
    pub fn with_state(mut self, stream_state: Value) -> Self {
        self.stream_state = stream_state;
        self
    }

    /// Sets the stream slice.
    pub fn with_slice(mut self, stream_slice: Value) -> Self {
        self.stream_slice = stream_slice;
        self
    }

    /// Sets the next page token.
    pub fn with_next_page_token(mut self, next_page_token: Value) -> Self {
        self.next_page_token = Some(next_page_token);
        self
    }

    /// Returns true if this is the first page of the slice.
    pub fn is_first_page(&self) -> bool {
        self.next_page_token.is_none()
    }
}
