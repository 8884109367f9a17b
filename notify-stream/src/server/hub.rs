//! Per-user fan-out of domain events.

use crate::error::EventTypeError;
use crate::logging::RedactionEngine;
use crate::stream::names;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The two push streams served by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Activity notifications
    Notifications,
    /// Direct and group messages
    Messages,
}

impl StreamKind {
    /// Route path of the stream.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Notifications => "/api/v1/notifications/stream",
            Self::Messages => "/api/v1/messages/stream",
        }
    }

    /// Event name used when a publisher does not pick one.
    pub fn default_event_type(&self) -> &'static str {
        match self {
            Self::Notifications => names::MESSAGE,
            Self::Messages => names::GROUP_MESSAGE,
        }
    }
}

const RESERVED_EVENT_TYPES: [&str; 3] = [names::CONNECTED, names::PING, names::RECONNECT];

/// Check that `event_type` can be sent as a domain event name.
pub fn validate_event_type(event_type: &str) -> Result<(), EventTypeError> {
    if event_type.is_empty() {
        return Err(EventTypeError::Empty);
    }
    if event_type.contains(['\r', '\n']) {
        return Err(EventTypeError::LineBreak(event_type.to_string()));
    }
    if RESERVED_EVENT_TYPES.contains(&event_type) {
        return Err(EventTypeError::Reserved(event_type.to_string()));
    }
    Ok(())
}

/// A domain event addressed to one user's stream.
///
/// The name is checked on construction, so every instance renders as a
/// single SSE `event:` line that clients cannot mistake for a control event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    event_type: String,
    payload: Value,
}

impl DomainEvent {
    /// Create an event with an explicit name.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Result<Self, EventTypeError> {
        let event_type = event_type.into();
        validate_event_type(&event_type)?;
        Ok(Self {
            event_type,
            payload,
        })
    }

    /// Create an event with the stream's default name.
    pub fn for_stream(kind: StreamKind, payload: Value) -> Self {
        Self {
            event_type: kind.default_event_type().to_string(),
            payload,
        }
    }

    /// SSE event name.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// JSON body.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Outcome of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    /// Delivered to this many sessions
    Delivered(usize),
    /// The user has no open session on the stream
    NoSubscribers,
}

type ChannelKey = (StreamKind, String);

/// Broadcast channels keyed by stream and user.
///
/// Channels are created on first subscribe and removed when their last
/// subscription is dropped.
#[derive(Debug)]
pub struct NotificationHub {
    channels: DashMap<ChannelKey, broadcast::Sender<DomainEvent>>,
    capacity: usize,
    redaction: RedactionEngine,
}

impl NotificationHub {
    /// Create a hub with the given per-channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            redaction: RedactionEngine::default(),
        }
    }

    /// Subscribe to a user's stream.
    pub fn subscribe(self: &Arc<Self>, kind: StreamKind, user_id: &str) -> HubSubscription {
        let key = (kind, user_id.to_string());
        let receiver = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        HubSubscription {
            hub: Arc::clone(self),
            key,
            receiver,
        }
    }

    /// Publish an event to every open session of a user's stream.
    pub fn publish(&self, kind: StreamKind, user_id: &str, event: DomainEvent) -> PublishResult {
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                stream = ?kind,
                user_id = %user_id,
                event_type = %event.event_type,
                payload = %self.redaction.redact(&event.payload),
                "Publishing domain event"
            );
        }

        let key = (kind, user_id.to_string());
        match self.channels.get(&key) {
            Some(sender) => match sender.send(event) {
                Ok(count) => PublishResult::Delivered(count),
                Err(_) => PublishResult::NoSubscribers,
            },
            None => PublishResult::NoSubscribers,
        }
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of open sessions on a user's stream.
    pub fn subscriber_count(&self, kind: StreamKind, user_id: &str) -> usize {
        self.channels
            .get(&(kind, user_id.to_string()))
            .map_or(0, |sender| sender.receiver_count())
    }

    fn prune(&self, key: &ChannelKey) {
        // Runs before the departing receiver is dropped, so it still counts.
        self.channels
            .remove_if(key, |_, sender| sender.receiver_count() <= 1);
    }
}

/// One session's view of a user's stream.
#[derive(Debug)]
pub struct HubSubscription {
    hub: Arc<NotificationHub>,
    key: ChannelKey,
    receiver: broadcast::Receiver<DomainEvent>,
}

impl HubSubscription {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<DomainEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Stream this subscription belongs to.
    pub fn kind(&self) -> StreamKind {
        self.key.0
    }
}

impl Drop for HubSubscription {
    fn drop(&mut self) {
        self.hub.prune(&self.key);
    }
}
