//! Error types for the notification pipeline
//!
//! Every failure in the pipeline is classified into one of a small set of
//! typed errors:
//!
//! - [`CredentialError`] - credential acquisition failed after all retries.
//!   This is the only failure that becomes visible on the client status.
//! - [`TransportError`] - the push connection failed or closed. Always
//!   recovered locally by reconnecting.
//! - [`EventParseError`] - a single event payload was malformed. Logged and
//!   dropped without touching the connection.
//! - [`ClientError`] - a control call reached a client that has shut down.
//!
//! Each error maps to an [`ErrorCode`], which serializes as
//! SCREAMING_SNAKE_CASE for consumers that surface error state.
//!
//! # Example
//! ```rust,ignore
//! use notify_stream::{CredentialError, ErrorCode};
//!
//! match dispatcher.get_token(false).await {
//!     Ok(credential) => use_token(credential.token()),
//!     Err(err) if err.code() == ErrorCode::LoginRequired => redirect_to_login(),
//!     Err(err) => tracing::warn!(error = %err, "token unavailable"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Type-safe error codes for pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    /// No credential could be acquired
    CredentialUnavailable,
    /// The identity provider requires an interactive login
    LoginRequired,
    /// The push connection failed
    TransportFailed,
    /// The stream endpoint rejected the credential
    Unauthorized,
    /// An event payload could not be parsed
    MalformedEvent,
    /// A published event name is not allowed on the wire
    InvalidEventType,
    /// The client actor is no longer running
    ClientShutdown,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialUnavailable => "CREDENTIAL_UNAVAILABLE",
            Self::LoginRequired => "LOGIN_REQUIRED",
            Self::TransportFailed => "TRANSPORT_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::MalformedEvent => "MALFORMED_EVENT",
            Self::InvalidEventType => "INVALID_EVENT_TYPE",
            Self::ClientShutdown => "CLIENT_SHUTDOWN",
        }
    }

    /// Returns true if the condition is normally cleared by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CredentialUnavailable | Self::TransportFailed | Self::Unauthorized
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Credential Errors
// =============================================================================

/// Classification of a single failed credential acquisition attempt.
///
/// Credential sources report this kind explicitly so the dispatcher never has
/// to inspect error messages to decide how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Network hiccup or upstream 5xx
    Transient,
    /// The attempt exceeded the per-attempt timeout
    Timeout,
    /// Upstream refresh material is stale; the next attempt must bypass the
    /// upstream cache
    StaleRefresh,
    /// The session is gone and a user login is required
    LoginRequired,
    /// The source answered with something unusable
    Invalid,
}

impl SourceErrorKind {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::LoginRequired)
    }

    /// Whether the next attempt must disable upstream caching.
    pub fn requires_cache_bypass(&self) -> bool {
        matches!(self, Self::StaleRefresh)
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::StaleRefresh => "stale_refresh",
            Self::LoginRequired => "login_required",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Failure reported by a credential source for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SourceError {
    /// Failure classification
    pub kind: SourceErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl SourceError {
    /// Create a new source error.
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Transient, message)
    }

    /// Create a timeout failure for an attempt bounded by `limit`.
    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            SourceErrorKind::Timeout,
            format!("no credential within {}ms", limit.as_millis()),
        )
    }

    /// Create a stale refresh material failure.
    pub fn stale_refresh(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::StaleRefresh, message)
    }

    /// Create a login required failure.
    pub fn login_required(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::LoginRequired, message)
    }

    /// Create an invalid response failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Invalid, message)
    }
}

/// Credential acquisition failed after all retries.
///
/// Cloneable so a single failed acquisition can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("credential acquisition failed after {attempts} attempt(s): {cause}")]
pub struct CredentialError {
    /// Number of attempts made
    pub attempts: u32,
    /// Failure of the last attempt
    pub cause: SourceError,
}

impl CredentialError {
    /// Create a new credential error.
    pub fn new(attempts: u32, cause: SourceError) -> Self {
        Self { attempts, cause }
    }

    /// Kind of the last failure.
    pub fn kind(&self) -> SourceErrorKind {
        self.cause.kind
    }

    /// Error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self.cause.kind {
            SourceErrorKind::LoginRequired => ErrorCode::LoginRequired,
            _ => ErrorCode::CredentialUnavailable,
        }
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure of the push connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Connection could not be established or broke mid-stream
    #[error("network error: {0}")]
    Network(String),
    /// The endpoint answered with a non-success status
    #[error("stream endpoint returned HTTP {0}")]
    Status(u16),
    /// The endpoint rejected the credential
    #[error("stream endpoint rejected the credential")]
    Unauthorized,
    /// The server ended the response
    #[error("stream closed by server")]
    Closed,
    /// Nothing arrived on the connection for too long
    #[error("no frame received for {}ms", .0.as_millis())]
    IdleTimeout(Duration),
}

impl TransportError {
    /// Error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized => ErrorCode::Unauthorized,
            _ => ErrorCode::TransportFailed,
        }
    }
}

// =============================================================================
// Event and Client Errors
// =============================================================================

/// A single event payload could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed `{event_type}` payload: {reason}")]
pub struct EventParseError {
    /// SSE event name of the offending frame
    pub event_type: String,
    /// Parser message
    pub reason: String,
}

impl EventParseError {
    /// Error code for this failure.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::MalformedEvent
    }
}

/// A domain event name that cannot be published.
///
/// Names must fit on one SSE `event:` line and must not collide with the
/// stream's control events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventTypeError {
    /// The name is empty
    #[error("event type must not be empty")]
    Empty,
    /// The name contains CR or LF
    #[error("event type {0:?} contains a line break")]
    LineBreak(String),
    /// The name belongs to a control event
    #[error("event type `{0}` is reserved for stream control")]
    Reserved(String),
}

impl EventTypeError {
    /// Error code for this failure.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidEventType
    }
}

/// Control call on a client whose actor is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The client has been shut down
    #[error("event stream client has shut down")]
    Shutdown,
}

impl ClientError {
    /// Error code for this failure.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ClientShutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::CredentialUnavailable).unwrap();
        assert_eq!(json, "\"CREDENTIAL_UNAVAILABLE\"");
        assert_eq!(ErrorCode::LoginRequired.to_string(), "LOGIN_REQUIRED");
    }

    #[test]
    fn test_credential_error_code_follows_cause() {
        let err = CredentialError::new(1, SourceError::login_required("session expired"));
        assert_eq!(err.code(), ErrorCode::LoginRequired);
        assert!(!err.code().is_retryable());

        let err = CredentialError::new(3, SourceError::transient("502"));
        assert_eq!(err.code(), ErrorCode::CredentialUnavailable);
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn test_source_error_kind_flags() {
        assert!(SourceErrorKind::StaleRefresh.requires_cache_bypass());
        assert!(!SourceErrorKind::Transient.requires_cache_bypass());
        assert!(!SourceErrorKind::LoginRequired.is_retryable());
        assert!(SourceErrorKind::Timeout.is_retryable());
    }

    #[test]
    fn test_event_type_error_display() {
        let err = EventTypeError::LineBreak("a\nb".into());
        assert_eq!(err.to_string(), "event type \"a\\nb\" contains a line break");
        assert_eq!(err.code(), ErrorCode::InvalidEventType);
        assert!(!err.code().is_retryable());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::IdleTimeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "no frame received for 90000ms");
        assert_eq!(TransportError::Unauthorized.code(), ErrorCode::Unauthorized);
        assert_eq!(TransportError::Status(503).code(), ErrorCode::TransportFailed);
    }
}
