//! Core error types for `declarest`.

use thiserror::Error;

/// A syntax error found while parsing a template.
///
/// Raised when a template is compiled, which happens when a requester is
/// constructed. Evaluation itself never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {position} of template {template:?}")]
pub struct TemplateError {
    /// The template source that failed to parse.
    pub template: String,
    /// Byte offset of the offending token.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl TemplateError {
    pub(crate) fn new(template: &str, position: usize, message: impl Into<String>) -> Self {
        Self {
            template: template.to_string(),
            position,
            message: message.into(),
        }
    }
}

/// Core error type for `declarest`.
///
/// Every variant describes a configuration problem. These are fatal and
/// must never be retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An HTTP method name that maps to no known method.
    #[error("Unknown HTTP method: {0:?}")]
    InvalidMethod(String),

    /// A template with malformed expression syntax.
    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A base URL or joined request URL that cannot be parsed.
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error returned by a decoder when a response body is malformed.
///
/// Decoding failures are terminal; the core never retries them.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// One line of a JSON Lines body is not valid JSON.
    #[error("Invalid JSON on line {line}: {source}")]
    JsonLine {
        /// 1-based line number.
        line: usize,
        /// Underlying parser error.
        source: serde_json::Error,
    },

    /// The body is not well-formed XML.
    #[error("Invalid XML: {0}")]
    Xml(String),

    /// The body is not valid UTF-8.
    #[error("Response body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
