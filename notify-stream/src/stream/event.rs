//! Typed stream events.

use super::sse::SseFrame;
use crate::error::EventParseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire event names shared by the client and the endpoint.
pub mod names {
    /// Sent once after the session is authenticated
    pub const CONNECTED: &str = "connected";
    /// Default domain event on the notifications stream
    pub const MESSAGE: &str = "message";
    /// Default domain event on the messages stream
    pub const GROUP_MESSAGE: &str = "group_message";
    /// Heartbeat
    pub const PING: &str = "ping";
    /// Server asks the client to reconnect
    pub const RECONNECT: &str = "reconnect";
}

/// State of the push connection when an error was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    /// A connection attempt is in progress
    Connecting,
    /// The connection is open
    Open,
    /// The connection is closed
    Closed,
}

/// An event delivered to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The server accepted the session
    Connected {
        /// Session details sent by the server
        payload: Value,
    },
    /// A domain event
    Message {
        /// SSE event name, e.g. `message` or `group_message`
        event_type: String,
        /// JSON payload
        payload: Value,
    },
    /// Heartbeat
    Heartbeat,
    /// The server asked for a graceful reconnect
    ReconnectRequested,
    /// The connection failed
    Error {
        /// Connection state after the failure
        ready_state: ReadyState,
    },
}

impl StreamEvent {
    /// Decode a frame into an event.
    ///
    /// The `connected` payload is informational, so anything that is not
    /// JSON is kept as a string. Domain payloads must be JSON.
    pub fn from_frame(frame: &SseFrame) -> Result<Self, EventParseError> {
        match frame.event_name() {
            names::PING => Ok(Self::Heartbeat),
            names::RECONNECT => Ok(Self::ReconnectRequested),
            names::CONNECTED => {
                let payload = if frame.data.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&frame.data)
                        .unwrap_or_else(|_| Value::String(frame.data.clone()))
                };
                Ok(Self::Connected { payload })
            }
            event_type => {
                let payload = if frame.data.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&frame.data).map_err(|err| EventParseError {
                        event_type: event_type.to_string(),
                        reason: err.to_string(),
                    })?
                };
                Ok(Self::Message {
                    event_type: event_type.to_string(),
                    payload,
                })
            }
        }
    }

    /// Wire name of the event.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Connected { .. } => names::CONNECTED,
            Self::Message { event_type, .. } => event_type,
            Self::Heartbeat => names::PING,
            Self::ReconnectRequested => names::RECONNECT,
            Self::Error { .. } => "error",
        }
    }

    /// Whether this is a domain event.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Message { .. })
    }

    /// Payload of a domain or connected event.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Connected { payload } | Self::Message { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_name_is_message() {
        let frame = SseFrame {
            data: r#"{"id":1}"#.into(),
            ..SseFrame::default()
        };
        let event = StreamEvent::from_frame(&frame).unwrap();
        assert_eq!(
            event,
            StreamEvent::Message {
                event_type: "message".into(),
                payload: json!({"id": 1}),
            }
        );
        assert!(event.is_domain());
    }

    #[test]
    fn test_control_events() {
        assert_eq!(
            StreamEvent::from_frame(&SseFrame::new("ping", "{}")).unwrap(),
            StreamEvent::Heartbeat
        );
        assert_eq!(
            StreamEvent::from_frame(&SseFrame::new("reconnect", "")).unwrap(),
            StreamEvent::ReconnectRequested
        );
    }

    #[test]
    fn test_connected_is_lenient() {
        let event = StreamEvent::from_frame(&SseFrame::new("connected", "hello")).unwrap();
        assert_eq!(
            event,
            StreamEvent::Connected {
                payload: Value::String("hello".into())
            }
        );
    }

    #[test]
    fn test_malformed_domain_payload() {
        let err = StreamEvent::from_frame(&SseFrame::new("group_message", "{oops")).unwrap_err();
        assert_eq!(err.event_type, "group_message");
    }

    #[test]
    fn test_serde_tag() {
        let json = serde_json::to_value(StreamEvent::Error {
            ready_state: ReadyState::Closed,
        })
        .unwrap();
        assert_eq!(json, json!({"type": "error", "ready_state": "closed"}));
    }
}
