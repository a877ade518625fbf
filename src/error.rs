//! Error types for fetch attempts.
//!
//! Transport and validation failures both end up in
//! [`FetchState::Error`](crate::state::FetchState::Error) as a [`FetchError`],
//! which keeps the distinction so a UI can tell a network problem from a
//! malformed response. Cancellation is reported by transports as
//! [`TransportError::Cancelled`] and is never stored in a state.

use thiserror::Error;

use crate::deferred::Aborted;
use crate::url::UrlError;

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}")]
    Status { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response body: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Returns `true` if the exchange was aborted through its cancellation token.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A response body was rejected by a [`Validator`](crate::validate::Validator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::new(err.to_string())
    }
}

/// Error carried by a failed attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Url(#[from] UrlError),

    #[error(transparent)]
    Aborted(#[from] Aborted),
}

impl FetchError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }

    /// HTTP status of the failed exchange, if the server answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::from(TransportError::Network("connection refused".to_string()));
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = FetchError::from(ValidationError::new("missing field `id`"));
        assert_eq!(err.to_string(), "Validation failed: missing field `id`");

        let err = TransportError::Status {
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "Request failed with status 404");
    }

    #[test]
    fn test_fetch_error_status() {
        let err = FetchError::from(TransportError::Status {
            status: 500,
            body: "boom".to_string(),
        });
        assert_eq!(err.status(), Some(500));
        assert_eq!(FetchError::from(TransportError::Timeout).status(), None);
    }

    #[test]
    fn test_cancelled_predicate() {
        assert!(FetchError::from(TransportError::Cancelled).is_cancelled());
        assert!(!FetchError::from(TransportError::Timeout).is_cancelled());
    }
}
