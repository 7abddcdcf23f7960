//! Fetch error types.
//!
//! Every failure maps to exactly one [`ErrorKind`]:
//!
//! | Kind            | Variants                                              |
//! |-----------------|-------------------------------------------------------|
//! | `Configuration` | `Config`, `Definition`                                |
//! | `Transient`     | `Transport` with a connect/timeout cause              |
//! | `Terminal`      | `Terminal`, `RetriesExhausted`, `TransportRetriesExhausted`, other `Transport` |
//! | `Decode`        | `Decode`                                              |

use declarest_core::{CoreError, DecodeError};
use thiserror::Error;

// ============================================================================
// Error Kind
// ============================================================================

/// Category of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid method, template, URL, or definition. Fatal, never retried.
    Configuration,
    /// A condition the retry loop may still recover from.
    Transient,
    /// A non-retryable response, or a transient one with retries spent.
    Terminal,
    /// A malformed response body.
    Decode,
}

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for request building, execution, and interpretation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Configuration error from the core.
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    /// The declarative requester definition could not be read.
    #[error("Invalid requester definition: {0}")]
    Definition(String),

    /// The server kept answering with a transient status.
    #[error("Retries exhausted after {attempts} attempts, last status {status}")]
    RetriesExhausted {
        /// Status of the last response.
        status: u16,
        /// Total attempts made, including the first.
        attempts: u32,
    },

    /// The server answered with a non-retryable status.
    #[error("Request failed with status {status}: {body}")]
    Terminal {
        /// Response status.
        status: u16,
        /// Response body, lossily decoded and truncated.
        body: String,
    },

    /// The transport kept failing with a transient error.
    #[error("Transport failed after {attempts} attempts: {source}")]
    TransportRetriesExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// The last transport error.
        source: TransportError,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FetchError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Definition(_) => ErrorKind::Configuration,
            Self::Transport(e) if e.is_transient() => ErrorKind::Transient,
            Self::Terminal { .. }
            | Self::RetriesExhausted { .. }
            | Self::TransportRetriesExhausted { .. }
            | Self::Transport(_) => ErrorKind::Terminal,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Returns true if a caller may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<serde_yaml::Error> for FetchError {
    fn from(err: serde_yaml::Error) -> Self {
        FetchError::Definition(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Definition(err.to_string())
    }
}

// ============================================================================
// Transport Error
// ============================================================================

/// Error raised while executing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request error.
    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Connection failures and timeouts are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::DomainNotAllowed(_) | Self::InvalidUrl(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            FetchError::Config(CoreError::InvalidMethod("FOO".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            FetchError::Definition("bad".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            FetchError::Terminal {
                status: 404,
                body: String::new()
            }
            .kind(),
            ErrorKind::Terminal
        );
        assert_eq!(
            FetchError::RetriesExhausted {
                status: 503,
                attempts: 4
            }
            .kind(),
            ErrorKind::Terminal
        );
        assert_eq!(
            FetchError::Transport(TransportError::DomainNotAllowed("evil.com".into())).kind(),
            ErrorKind::Terminal
        );
    }

    #[test]
    fn test_decode_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = FetchError::Decode(DecodeError::Json(json_err));
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_definition_from_yaml() {
        let yaml_err = serde_yaml::from_str::<u32>("[").unwrap_err();
        assert!(matches!(FetchError::from(yaml_err), FetchError::Definition(_)));
    }
}
