//! SSE stream endpoint.
//!
//! Each session receives, in order:
//!
//! 1. `connected` right after the token is verified
//! 2. `ping` every `heartbeat_interval`, interleaved with domain events
//! 3. `reconnect` once the session is `reconnect_after` old, after which the
//!    response ends so the client cycles before the platform's hard
//!    connection limit cuts it

use super::auth::{Principal, TokenVerifier, VerifyError};
use super::hub::{DomainEvent, HubSubscription, NotificationHub, StreamKind};
use crate::config::{ConfigValidationError, ServerConfig};
use crate::error::ErrorCode;
use crate::logging::{SessionLogEvent, log_session_event};
use crate::stream::{ConnectionId, names};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};

/// Shared state of the stream routes.
#[derive(Clone)]
pub struct EndpointState {
    /// Event fan-out
    pub hub: Arc<NotificationHub>,
    verifier: Arc<dyn TokenVerifier>,
    config: ServerConfig,
}

impl EndpointState {
    /// Create endpoint state with a fresh hub sized from `config`.
    ///
    /// Returns an error if `config` fails [`ServerConfig::validate`].
    pub fn new(
        verifier: impl TokenVerifier + 'static,
        config: ServerConfig,
    ) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self {
            hub: Arc::new(NotificationHub::new(config.channel_capacity)),
            verifier: Arc::new(verifier),
            config,
        })
    }

    /// Heartbeat and reconnect timing.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Query string of a stream request.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Bearer token; the push transport cannot send headers
    pub token: Option<String>,
}

/// A rejected stream request.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// No token in the query string
    #[error("missing token")]
    MissingToken,
    /// The verifier rejected the token
    #[error("invalid token")]
    InvalidToken,
    /// The verifier could not be reached
    #[error("token verification unavailable")]
    VerifierUnavailable,
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingToken | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::VerifierUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = json!({
            "code": ErrorCode::Unauthorized,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Routes for both push streams.
pub fn stream_routes(state: EndpointState) -> Router {
    Router::new()
        .route(StreamKind::Notifications.path(), get(notifications_stream))
        .route(StreamKind::Messages.path(), get(messages_stream))
        .with_state(state)
}

async fn notifications_stream(
    State(state): State<EndpointState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, EndpointError> {
    open_stream(state, StreamKind::Notifications, query).await
}

async fn messages_stream(
    State(state): State<EndpointState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, EndpointError> {
    open_stream(state, StreamKind::Messages, query).await
}

/// Authenticate a request and start its session.
pub async fn open_stream(
    state: EndpointState,
    kind: StreamKind,
    query: StreamQuery,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, EndpointError> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or(EndpointError::MissingToken)?;
    let principal = state
        .verifier
        .verify(&token)
        .await
        .map_err(|err| match err {
            VerifyError::Rejected(_) => EndpointError::InvalidToken,
            VerifyError::Unavailable(reason) => {
                tracing::warn!(reason = %reason, "Token verifier unavailable");
                EndpointError::VerifierUnavailable
            }
        })?;

    let subscription = state.hub.subscribe(kind, &principal.user_id);
    let frames = session_frames(principal, subscription, state.config);
    Ok(Sse::new(
        frames.map(|frame| Ok::<_, Infallible>(frame.into_event())),
    ))
}

/// One event of a stream session.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Session accepted
    Connected(Value),
    /// Heartbeat
    Ping,
    /// Reconnect deadline reached
    Reconnect,
    /// Published domain event
    Domain(DomainEvent),
}

impl ServerFrame {
    /// SSE event name.
    pub fn event_name(&self) -> &str {
        match self {
            Self::Connected(_) => names::CONNECTED,
            Self::Ping => names::PING,
            Self::Reconnect => names::RECONNECT,
            Self::Domain(event) => event.event_type(),
        }
    }

    /// Render as an SSE event.
    pub fn into_event(self) -> Event {
        let data = match &self {
            Self::Connected(payload) => payload.to_string(),
            Self::Ping => json!({ "ts": chrono::Utc::now().timestamp_millis() }).to_string(),
            Self::Reconnect => json!({ "reason": "max_duration" }).to_string(),
            Self::Domain(event) => event.payload().to_string(),
        };
        Event::default().event(self.event_name()).data(data)
    }
}

/// The frame sequence of one session.
///
/// `config` must pass [`ServerConfig::validate`]; a zero heartbeat interval
/// cannot be scheduled.
pub fn session_frames(
    principal: Principal,
    mut subscription: HubSubscription,
    config: ServerConfig,
) -> impl Stream<Item = ServerFrame> + Send + 'static {
    enum Step {
        Frame(ServerFrame),
        Lagged(u64),
        Deadline,
        End,
    }

    async_stream::stream! {
        let started = Instant::now();
        let mut session = SessionGuard {
            connection_id: ConnectionId::new().to_string(),
            user_id: principal.user_id,
            started,
            delivered: 0,
        };
        log_session_event(
            &session.connection_id,
            &session.user_id,
            SessionLogEvent::Opened { path: subscription.kind().path() },
        );

        yield ServerFrame::Connected(json!({
            "userId": session.user_id,
            "connectionId": session.connection_id,
            "heartbeatIntervalMs": config.heartbeat_interval.as_millis() as u64,
            "reconnectAfterMs": config.reconnect_after.as_millis() as u64,
        }));

        let mut heartbeat =
            tokio::time::interval_at(started + config.heartbeat_interval, config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep_until(started + config.reconnect_after);
        tokio::pin!(deadline);

        loop {
            let step = tokio::select! {
                biased;
                _ = &mut deadline => Step::Deadline,
                received = subscription.recv() => match received {
                    Ok(event) => Step::Frame(ServerFrame::Domain(event)),
                    Err(RecvError::Lagged(skipped)) => Step::Lagged(skipped),
                    Err(RecvError::Closed) => Step::End,
                },
                _ = heartbeat.tick() => Step::Frame(ServerFrame::Ping),
            };

            match step {
                Step::Frame(frame) => {
                    if matches!(frame, ServerFrame::Domain(_)) {
                        session.delivered += 1;
                    }
                    yield frame;
                }
                Step::Lagged(skipped) => log_session_event(
                    &session.connection_id,
                    &session.user_id,
                    SessionLogEvent::Lagged { skipped },
                ),
                Step::Deadline => {
                    log_session_event(
                        &session.connection_id,
                        &session.user_id,
                        SessionLogEvent::ReconnectSent { age_ms: session.age_ms() },
                    );
                    yield ServerFrame::Reconnect;
                    break;
                }
                Step::End => break,
            }
        }
    }
}

// Logs the end of a session however it ends, including client disconnects.
struct SessionGuard {
    connection_id: String,
    user_id: String,
    started: Instant,
    delivered: u64,
}

impl SessionGuard {
    fn age_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        log_session_event(
            &self.connection_id,
            &self.user_id,
            SessionLogEvent::Closed {
                age_ms: self.age_ms(),
                delivered: self.delivered,
            },
        );
    }
}
