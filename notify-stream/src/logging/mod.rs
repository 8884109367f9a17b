//! Structured logging for the notification pipeline.
//!
//! All logging goes through `tracing` with structured fields so connection
//! ids, user ids and attempt counters can be filtered on. Bearer values are
//! scrubbed before anything reaches a subscriber.
//!
//! - **constants**: redaction defaults and the log target
//! - **redaction**: URL token scrubbing and JSON field redaction
//! - **events**: typed lifecycle events and their logging functions

pub mod constants;
pub mod events;
pub mod redaction;

pub use constants::{DEFAULT_REDACTION_REPLACEMENT, DEFAULT_SENSITIVE_FIELDS};
pub use events::{
    CredentialLogEvent, SessionLogEvent, StreamLogEvent, log_credential_event,
    log_session_event, log_stream_event,
};
pub use redaction::{RedactionEngine, redact_url};
