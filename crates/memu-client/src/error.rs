//! Error types for MemU client operations.
//!
//! Every failure a logical call can end in is a variant of [`MemuError`].
//! HTTP-derived variants carry the status code and the decoded response body
//! so callers can inspect what the server actually said.

use std::fmt;
use std::time::Duration;

use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::executor::Payload;

/// Result type alias for MemU client operations.
pub type MemuResult<T> = Result<T, MemuError>;

const AUTHENTICATION_MESSAGE: &str = "Authentication failed. Please check your API key.";
const VALIDATION_MESSAGE: &str =
    "Request validation failed. Please check your request parameters.";

/// Why a call stopped before reaching a terminal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Main error type for all MemU client operations.
#[derive(Error, Debug)]
pub enum MemuError {
    /// The request never produced a response (connection, DNS, timeout).
    #[error("MemU API error: request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The caller cancelled the call or its deadline passed.
    #[error("MemU API error: request {reason} after {attempts} attempts")]
    Cancelled { reason: CancelReason, attempts: u32 },

    /// Rate limit still exceeded once retries ran out (429).
    #[error("MemU API error (status {status}): {message}")]
    RateLimit {
        message: String,
        status: u16,
        /// Wait that would have preceded the next attempt.
        retry_after: Duration,
        body: Option<Payload>,
    },

    /// Server-side failure once retries ran out (5xx).
    #[error("MemU API error (status {status}): {message}")]
    Server {
        message: String,
        status: u16,
        body: Option<Payload>,
    },

    /// API key rejected (401).
    #[error("MemU API error (status {status}): {message}")]
    Authentication {
        message: String,
        status: u16,
        body: Option<Payload>,
    },

    /// Requested resource does not exist (404).
    #[error("MemU API error (status {status}): {message}")]
    NotFound {
        message: String,
        status: u16,
        body: Option<Payload>,
    },

    /// Server rejected the request parameters (422).
    #[error("MemU API error (status {status}): {message}")]
    Validation {
        message: String,
        status: u16,
        body: Option<Payload>,
    },

    /// Any other 4xx response.
    #[error("MemU API error (status {status}): {message}")]
    Client {
        message: String,
        status: u16,
        body: Option<Payload>,
    },

    /// The request body could not be encoded.
    #[error("MemU API error: failed to serialize request body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local parameter validation failed; nothing was sent.
    #[error("MemU API error: {0}")]
    InvalidArgument(String),

    /// A successful response could not be shaped into the expected type.
    #[error("MemU API error: {message}")]
    Parse { message: String },

    /// Client configuration is unusable.
    #[error("MemU configuration error: {0}")]
    Configuration(String),
}

/// Machine-readable discriminant of a [`MemuError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Cancelled,
    RateLimit,
    Server,
    Authentication,
    NotFound,
    Validation,
    Client,
    Serialization,
    InvalidArgument,
    Parse,
    Configuration,
}

impl ErrorKind {
    /// Get the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

impl MemuError {
    /// Map a terminal 4xx response onto the error taxonomy.
    ///
    /// A non-empty `message` string in the body replaces the default message
    /// for 401, 404 and 422. Other statuses always report `HTTP {status}: {path}`.
    pub fn from_status(status: u16, path: &str, body: Option<Payload>) -> Self {
        let server_message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        match status {
            401 => Self::Authentication {
                message: server_message.unwrap_or_else(|| AUTHENTICATION_MESSAGE.to_string()),
                status,
                body,
            },
            404 => Self::NotFound {
                message: server_message.unwrap_or_else(|| format!("Resource not found: {}", path)),
                status,
                body,
            },
            422 => Self::Validation {
                message: server_message.unwrap_or_else(|| VALIDATION_MESSAGE.to_string()),
                status,
                body,
            },
            _ => Self::Client {
                message: format!("HTTP {}: {}", status, path),
                status,
                body,
            },
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Server { .. } => ErrorKind::Server,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Client { .. } => ErrorKind::Client,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// HTTP status code, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimit { status, .. }
            | Self::Server { status, .. }
            | Self::Authentication { status, .. }
            | Self::NotFound { status, .. }
            | Self::Validation { status, .. }
            | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Decoded response body, when the server sent one.
    pub fn body(&self) -> Option<&Payload> {
        match self {
            Self::RateLimit { body, .. }
            | Self::Server { body, .. }
            | Self::Authentication { body, .. }
            | Self::NotFound { body, .. }
            | Self::Validation { body, .. }
            | Self::Client { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Wait the client computed before giving up on a rate-limited call.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Authentication { .. } => Some("Please check your MEMU_API_KEY"),
            Self::RateLimit { .. } => Some("Please wait before making more requests"),
            Self::NotFound { .. } => Some("Please check the task or resource ID"),
            Self::Validation { .. } | Self::InvalidArgument(_) => {
                Some("Please check your request parameters")
            }
            Self::Transport { .. } => Some("Please check your network connection and base URL"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Option<Payload> {
        value.as_object().cloned()
    }

    #[test]
    fn test_authentication_default_message() {
        let err = MemuError::from_status(401, "/api/v3/memory/memorize", None);
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.status(), Some(401));
        assert_eq!(
            err.to_string(),
            "MemU API error (status 401): Authentication failed. Please check your API key."
        );
    }

    #[test]
    fn test_authentication_server_message() {
        let err = MemuError::from_status(401, "/x", body(json!({"message": "Key revoked"})));
        assert!(matches!(err, MemuError::Authentication { ref message, .. } if message == "Key revoked"));
        assert!(err.body().is_some());
    }

    #[test]
    fn test_not_found_uses_path() {
        let err = MemuError::from_status(404, "/api/v3/memory/memorize/status/t9", None);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err
            .to_string()
            .contains("Resource not found: /api/v3/memory/memorize/status/t9"));
    }

    #[test]
    fn test_validation_empty_message_keeps_default() {
        let err = MemuError::from_status(422, "/x", body(json!({"message": ""})));
        assert!(matches!(
            err,
            MemuError::Validation { ref message, .. } if message == VALIDATION_MESSAGE
        ));
    }

    #[test]
    fn test_validation_non_string_message_ignored() {
        let err = MemuError::from_status(422, "/x", body(json!({"message": 42})));
        assert!(matches!(
            err,
            MemuError::Validation { ref message, .. } if message == VALIDATION_MESSAGE
        ));
    }

    #[test]
    fn test_generic_client_error_ignores_body_message() {
        let err = MemuError::from_status(403, "/api/v3/memory/retrieve", body(json!({"message": "nope"})));
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(
            err.to_string(),
            "MemU API error (status 403): HTTP 403: /api/v3/memory/retrieve"
        );
        assert_eq!(err.body().and_then(|b| b.get("message")), Some(&json!("nope")));
    }

    #[test]
    fn test_non_http_errors_have_no_status() {
        let err = MemuError::invalid_argument("Memorize: user_id is required");
        assert_eq!(err.status(), None);
        assert!(err.body().is_none());
        assert_eq!(err.kind().as_str(), "invalid_argument");
    }

    #[test]
    fn test_rate_limit_accessors() {
        let err = MemuError::RateLimit {
            message: "rate limit exceeded".to_string(),
            status: 429,
            retry_after: Duration::from_secs(5),
            body: None,
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        assert!(err.suggestion().is_some());
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
    }

    #[test]
    fn test_cancelled_display() {
        let err = MemuError::Cancelled {
            reason: CancelReason::DeadlineExceeded,
            attempts: 2,
        };
        assert_eq!(
            err.to_string(),
            "MemU API error: request deadline exceeded after 2 attempts"
        );
    }
}
