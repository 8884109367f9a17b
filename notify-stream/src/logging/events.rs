//! Event types and logging functions for pipeline lifecycle events.
//!
//! Each concern gets its own event enum and a function that picks the level:
//! routine traffic at trace/debug, lifecycle changes at info, failures at warn.

use super::redaction::redact_url;

// =============================================================================
// Stream Client Events
// =============================================================================

/// Event stream client lifecycle events.
#[derive(Debug, Clone)]
pub enum StreamLogEvent {
    /// A connection attempt started. The URL is redacted before logging.
    Connecting {
        /// Stream URL including the credential parameter.
        url: String,
    },
    /// The server sent `connected`.
    Connected,
    /// A heartbeat arrived.
    Heartbeat,
    /// The server asked for a graceful reconnect.
    ReconnectRequested,
    /// A domain event was published to subscribers.
    EventDelivered {
        /// SSE event name.
        event_type: String,
    },
    /// A frame was dropped because its payload could not be parsed.
    EventDropped {
        /// SSE event name.
        event_type: String,
        /// Parser message.
        reason: String,
    },
    /// The connection failed.
    Error {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// A reconnect was scheduled.
    RetryScheduled {
        /// Delay before the next attempt in milliseconds.
        delay_ms: u64,
        /// Consecutive failures so far.
        failures: u32,
    },
    /// The connection was dropped locally.
    Closed {
        /// Why the client closed it.
        reason: &'static str,
    },
}

/// Log a stream client event.
pub fn log_stream_event(connection_id: Option<&str>, event: StreamLogEvent) {
    let connection_id = connection_id.unwrap_or("-");
    match event {
        StreamLogEvent::Connecting { url } => {
            tracing::debug!(
                connection_id = %connection_id,
                url = %redact_url(&url),
                "Opening event stream"
            );
        }
        StreamLogEvent::Connected => {
            tracing::info!(connection_id = %connection_id, "Event stream connected");
        }
        StreamLogEvent::Heartbeat => {
            tracing::trace!(connection_id = %connection_id, "Heartbeat received");
        }
        StreamLogEvent::ReconnectRequested => {
            tracing::info!(
                connection_id = %connection_id,
                "Server requested graceful reconnect"
            );
        }
        StreamLogEvent::EventDelivered { event_type } => {
            tracing::trace!(
                connection_id = %connection_id,
                event_type = %event_type,
                "Stream event delivered"
            );
        }
        StreamLogEvent::EventDropped { event_type, reason } => {
            tracing::warn!(
                connection_id = %connection_id,
                event_type = %event_type,
                reason = %reason,
                "Dropping malformed stream event"
            );
        }
        StreamLogEvent::Error { code, message } => {
            tracing::warn!(
                connection_id = %connection_id,
                error_code = %code,
                error_message = %message,
                "Event stream error"
            );
        }
        StreamLogEvent::RetryScheduled { delay_ms, failures } => {
            tracing::debug!(
                connection_id = %connection_id,
                delay_ms = %delay_ms,
                failures = %failures,
                "Reconnect scheduled"
            );
        }
        StreamLogEvent::Closed { reason } => {
            tracing::debug!(
                connection_id = %connection_id,
                reason = %reason,
                "Event stream closed"
            );
        }
    }
}

// =============================================================================
// Credential Events
// =============================================================================

/// Credential dispatcher events.
#[derive(Debug, Clone)]
pub enum CredentialLogEvent {
    /// Served from cache.
    CacheHit,
    /// Caller joined an acquisition already in flight.
    Joined,
    /// An acquisition attempt started.
    AttemptStarted {
        /// 1-based attempt number.
        attempt: u32,
        /// Whether upstream caching is disabled for this attempt.
        bypass_cache: bool,
    },
    /// An attempt failed.
    AttemptFailed {
        /// 1-based attempt number.
        attempt: u32,
        /// Failure classification.
        kind: String,
        /// Failure detail.
        message: String,
    },
    /// A credential was acquired and cached.
    Acquired {
        /// Attempts used.
        attempts: u32,
        /// Cache lifetime in milliseconds.
        lifetime_ms: u64,
    },
    /// All attempts failed.
    Exhausted {
        /// Attempts used.
        attempts: u32,
        /// Classification of the last failure.
        kind: String,
    },
    /// The cache was cleared explicitly.
    Cleared,
}

/// Log a credential dispatcher event.
pub fn log_credential_event(event: CredentialLogEvent) {
    match event {
        CredentialLogEvent::CacheHit => {
            tracing::trace!("Credential cache hit");
        }
        CredentialLogEvent::Joined => {
            tracing::debug!("Joined in-flight credential acquisition");
        }
        CredentialLogEvent::AttemptStarted {
            attempt,
            bypass_cache,
        } => {
            tracing::debug!(
                attempt = %attempt,
                bypass_cache = %bypass_cache,
                "Acquiring credential"
            );
        }
        CredentialLogEvent::AttemptFailed {
            attempt,
            kind,
            message,
        } => {
            tracing::warn!(
                attempt = %attempt,
                kind = %kind,
                error_message = %message,
                "Credential attempt failed"
            );
        }
        CredentialLogEvent::Acquired {
            attempts,
            lifetime_ms,
        } => {
            tracing::debug!(
                attempts = %attempts,
                lifetime_ms = %lifetime_ms,
                "Credential acquired"
            );
        }
        CredentialLogEvent::Exhausted { attempts, kind } => {
            tracing::error!(
                attempts = %attempts,
                kind = %kind,
                "Credential acquisition exhausted retries"
            );
        }
        CredentialLogEvent::Cleared => {
            tracing::debug!("Credential cache cleared");
        }
    }
}

// =============================================================================
// Server Session Events
// =============================================================================

/// Stream endpoint session events.
#[derive(Debug, Clone)]
pub enum SessionLogEvent {
    /// A session was authenticated and opened.
    Opened {
        /// Stream path.
        path: &'static str,
    },
    /// The reconnect deadline was reached.
    ReconnectSent {
        /// Session age in milliseconds.
        age_ms: u64,
    },
    /// The session's receiver fell behind and skipped events.
    Lagged {
        /// Number of skipped events.
        skipped: u64,
    },
    /// The session ended.
    Closed {
        /// Session age in milliseconds.
        age_ms: u64,
        /// Events delivered during the session.
        delivered: u64,
    },
}

/// Log a stream endpoint session event.
pub fn log_session_event(connection_id: &str, user_id: &str, event: SessionLogEvent) {
    match event {
        SessionLogEvent::Opened { path } => {
            tracing::info!(
                connection_id = %connection_id,
                user_id = %user_id,
                path = %path,
                "Stream session opened"
            );
        }
        SessionLogEvent::ReconnectSent { age_ms } => {
            tracing::info!(
                connection_id = %connection_id,
                user_id = %user_id,
                age_ms = %age_ms,
                "Reconnect deadline reached"
            );
        }
        SessionLogEvent::Lagged { skipped } => {
            tracing::warn!(
                connection_id = %connection_id,
                user_id = %user_id,
                skipped = %skipped,
                "Stream session lagged, skipping events"
            );
        }
        SessionLogEvent::Closed { age_ms, delivered } => {
            tracing::info!(
                connection_id = %connection_id,
                user_id = %user_id,
                age_ms = %age_ms,
                delivered = %delivered,
                "Stream session closed"
            );
        }
    }
}
