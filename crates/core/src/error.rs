//! Error types for the Decentra domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The top-level [`Error`]
//! carries the failure taxonomy callers see; backends and adapters have their
//! own bounded-context errors that are mapped at the boundary.

use thiserror::Error;

/// The top-level error type for all Decentra operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied parameters failed a precondition. Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend rejected the request as malformed or unauthorized.
    #[error("Model request rejected by backend '{backend}': {source}")]
    ModelRequest {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// A transient backend failure persisted past the retry budget.
    #[error("Model unavailable after {attempts} attempts on backend '{backend}': {source}")]
    ModelUnavailable {
        backend: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// No usable backend could be resolved.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// The closed set of failure kinds a backend maps its native errors into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// HTTP 429 or an equivalent provider throttle.
    RateLimited,
    /// The connection could not be established or was reset.
    Connection,
    /// Generic server-side API error (5xx, overloaded, unparseable body).
    Api,
    /// The request exceeded the configured timeout.
    Timeout,
    /// The request was malformed or refers to something that does not exist.
    InvalidRequest,
    /// Credentials were rejected.
    Authentication,
    /// The backend cannot serve requests at all (missing key, disabled).
    Unavailable,
}

impl BackendErrorKind {
    /// Whether the gateway should retry a failure of this kind.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Connection | Self::Api | Self::Timeout
        )
    }
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::Connection => "connection error",
            Self::Api => "api error",
            Self::Timeout => "timeout",
            Self::InvalidRequest => "invalid request",
            Self::Authentication => "authentication failed",
            Self::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// A failure reported by a backend, already classified.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::RateLimited, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Connection, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Api, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidRequest, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Authentication, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unavailable, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Classify an HTTP status code returned by a model endpoint.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::rate_limited(body),
            408 => Self::timeout(body),
            401 | 403 => Self::authentication(body),
            500..=599 => Self::api(format!("{body} (status: {status})")),
            _ => Self::invalid_request(format!("{body} (status: {status})")),
        }
    }
}

/// Errors raised by retrieval adapters. Never surfaced to callers of a verb.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Request to {source_name} failed: {reason}")]
    RequestFailed { source_name: String, reason: String },

    #[error("Unexpected payload from {source_name}: {reason}")]
    InvalidPayload { source_name: String, reason: String },

    #[error("Unsupported filter for {0}")]
    UnsupportedFilter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_closed_set() {
        assert!(BackendErrorKind::RateLimited.is_transient());
        assert!(BackendErrorKind::Connection.is_transient());
        assert!(BackendErrorKind::Api.is_transient());
        assert!(BackendErrorKind::Timeout.is_transient());
        assert!(!BackendErrorKind::InvalidRequest.is_transient());
        assert!(!BackendErrorKind::Authentication.is_transient());
        assert!(!BackendErrorKind::Unavailable.is_transient());
    }

    #[test]
    fn status_classification() {
        assert_eq!(BackendError::from_status(429, "").kind, BackendErrorKind::RateLimited);
        assert_eq!(BackendError::from_status(408, "").kind, BackendErrorKind::Timeout);
        assert_eq!(BackendError::from_status(503, "").kind, BackendErrorKind::Api);
        assert_eq!(BackendError::from_status(401, "").kind, BackendErrorKind::Authentication);
        assert_eq!(BackendError::from_status(400, "").kind, BackendErrorKind::InvalidRequest);
    }

    #[test]
    fn model_unavailable_displays_attempts() {
        let err = Error::ModelUnavailable {
            backend: "openai".into(),
            attempts: 7,
            source: BackendError::rate_limited("Too many requests"),
        };
        let text = err.to_string();
        assert!(text.contains("7 attempts"));
        assert!(text.contains("Too many requests"));
    }

    #[test]
    fn model_request_preserves_backend_detail() {
        let err = Error::ModelRequest {
            backend: "openai".into(),
            source: BackendError::invalid_request("messages[1].role is invalid"),
        };
        assert!(err.to_string().contains("messages[1].role is invalid"));
    }
}
