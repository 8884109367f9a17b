#![warn(missing_docs)]
//! # notify-stream
//!
//! Real-time notification delivery over server-sent events.
//!
//! ## Overview
//!
//! - **Credential dispatcher**: caches short-lived bearer tokens, collapses
//!   concurrent acquisitions into one request and retries transient failures
//! - **Event stream client**: keeps one authenticated SSE connection alive,
//!   reconnects with exponential backoff, honours server-initiated graceful
//!   reconnects and page visibility
//! - **Stream endpoint**: axum routes emitting `connected`, heartbeats, domain
//!   events and a proactive `reconnect` before the platform connection limit
//! - **Notification store**: unread count and last event, fed by the stream
//!   and reconciled through the REST API
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      token      ┌────────────────────────┐
//! │ CredentialDispatcher │ ──────────────▶ │ EventStreamClient      │
//! │ cache, single-flight │                 │  actor: commands,      │
//! └──────────┬───────────┘                 │  connection, timers    │
//!            │ CredentialSource            └───────────┬────────────┘
//!            ▼                                         │ StreamEvent
//!     identity provider          SSE  ▲                ▼
//!                                     │     ┌────────────────────────┐
//! ┌──────────────────────┐            │     │ NotificationStore      │
//! │ stream_routes (axum) │ ───────────┘     │  unread count, last    │
//! │  NotificationHub     │                  └────────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use notify_stream::prelude::*;
//!
//! let config = CredentialConfig::new().with_audience("https://api.example.org");
//! let source = HttpCredentialSource::new("https://app.example.org/auth/token", &config);
//! let dispatcher = CredentialDispatcher::new(source, config)?;
//!
//! let url = Url::parse("https://api.example.org/api/v1/notifications/stream")?;
//! let client = EventStreamClient::builder(url, dispatcher.clone()).build()?;
//!
//! let store = NotificationStore::new();
//! store.attach(client.subscribe());
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;
pub mod stream;

#[cfg(test)]
mod tests;

pub use config::{ConfigValidationError, CredentialConfig, NotifyConfig, ServerConfig, StreamConfig};
pub use credential::{
    AcquireOptions, BearerToken, Credential, CredentialDispatcher, CredentialSource,
    HttpCredentialSource, IssuedToken, StaticCredentialSource,
};
pub use error::{
    ClientError, CredentialError, ErrorCode, EventParseError, EventTypeError, SourceError,
    SourceErrorKind, TransportError,
};
pub use reqwest::Url;
pub use server::{
    DomainEvent, EndpointState, NotificationHub, PublishResult, StaticTokenVerifier, StreamKind,
    TokenVerifier, stream_routes,
};
pub use store::{ApiError, Notification, NotificationStore, NotificationSummary, NotificationsApi};
pub use stream::{
    ClientBuilder, ClientStatus, ConnectionId, ConnectionState, EventStreamClient,
    EventSubscriber, HttpTransport, ReadyState, StreamEvent, Transport, Visibility,
};

/// Prelude for convenient imports
///
/// ```rust,ignore
/// use notify_stream::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ClientStatus, ConnectionState, Credential, CredentialConfig, CredentialDispatcher,
        CredentialError, CredentialSource, DomainEvent, EndpointState, ErrorCode,
        EventStreamClient, EventSubscriber, HttpCredentialSource, HttpTransport,
        NotificationHub, NotificationStore, NotificationsApi, NotifyConfig, ServerConfig,
        StaticCredentialSource, StaticTokenVerifier, StreamConfig, StreamEvent, StreamKind,
        Url, Visibility, stream_routes,
    };
}
