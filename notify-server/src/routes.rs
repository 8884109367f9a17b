//! Local-only routes next to the stream endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use notify_stream::EventTypeError;
use notify_stream::server::{
    DomainEvent, EndpointState, PublishResult, StreamKind, stream_routes,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Body of `POST /internal/notifications/:user_id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Target stream, `notifications` unless set
    #[serde(default)]
    pub stream: Option<TargetStream>,
    /// SSE event name, the stream's default unless set
    #[serde(default)]
    pub event_type: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStream {
    Notifications,
    Messages,
}

impl From<TargetStream> for StreamKind {
    fn from(target: TargetStream) -> Self {
        match target {
            TargetStream::Notifications => StreamKind::Notifications,
            TargetStream::Messages => StreamKind::Messages,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PublishResponse {
    pub delivered: usize,
}

/// A publish request whose event name cannot go on the wire.
#[derive(Debug)]
pub struct PublishRejected(EventTypeError);

impl IntoResponse for PublishRejected {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

pub fn app(state: EndpointState) -> Router {
    let internal = Router::new()
        .route("/health", get(health))
        .route("/internal/notifications/:user_id", post(publish))
        .with_state(state.clone());

    stream_routes(state).merge(internal)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn publish(
    State(state): State<EndpointState>,
    Path(user_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), PublishRejected> {
    let kind: StreamKind = request.stream.unwrap_or(TargetStream::Notifications).into();
    let event = match request.event_type {
        Some(event_type) => DomainEvent::new(event_type, request.payload).map_err(|err| {
            tracing::warn!(user_id = %user_id, error = %err, "Rejected publish");
            PublishRejected(err)
        })?,
        None => DomainEvent::for_stream(kind, request.payload),
    };

    let delivered = match state.hub.publish(kind, &user_id, event) {
        PublishResult::Delivered(delivered) => delivered,
        PublishResult::NoSubscribers => {
            tracing::debug!(user_id = %user_id, stream = ?kind, "No open session for event");
            0
        }
    };
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}
