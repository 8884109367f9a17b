//! Server side of the push channel.
//!
//! - **hub**: per-user broadcast channels for domain events
//! - **auth**: the [`TokenVerifier`] seam
//! - **endpoint**: axum SSE routes and the session frame sequence

pub mod auth;
pub mod endpoint;
pub mod hub;

pub use auth::{Principal, StaticTokenVerifier, TokenVerifier, VerifyError};
pub use endpoint::{
    EndpointError, EndpointState, ServerFrame, StreamQuery, open_stream, session_frames,
    stream_routes,
};
pub use hub::{
    DomainEvent, HubSubscription, NotificationHub, PublishResult, StreamKind, validate_event_type,
};
