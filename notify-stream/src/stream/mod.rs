//! Client side of the push channel.
//!
//! - **sse**: incremental `text/event-stream` decoder
//! - **event**: typed [`StreamEvent`]s decoded from frames
//! - **transport**: the [`Transport`] seam and the reqwest implementation
//! - **backoff**: exponential reconnect delay
//! - **state**: connection state machine and [`ClientStatus`]
//! - **client**: the [`EventStreamClient`] actor
//! - **subscriber**: lag-tolerant event receiver

pub mod backoff;
pub mod client;
pub mod event;
pub mod id;
pub mod sse;
pub mod state;
pub mod subscriber;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use client::{ClientBuilder, EventStreamClient, TOKEN_PARAM, stream_url};
pub use event::{ReadyState, StreamEvent, names};
pub use id::{ConnectionId, IdParseError};
pub use sse::{SseDecoder, SseFrame};
pub use state::{ClientStatus, ConnectionState, Visibility};
pub use subscriber::EventSubscriber;
pub use transport::{EventSource, HttpTransport, Transport};
