//! Connection state machine and client status.

use super::id::ConnectionId;
use crate::error::CredentialError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// State of the client's push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; a retry may be scheduled
    #[default]
    Idle,
    /// Acquiring a credential, opening, or waiting for `connected`
    Connecting,
    /// The server confirmed the session
    Open,
    /// The client has shut down (terminal)
    Closed,
}

impl ConnectionState {
    /// Check whether a transition to `next` is valid.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Idle)
                | (Open, Idle)
                | (Idle | Connecting | Open, Closed)
        )
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// In the foreground
    #[default]
    Visible,
    /// In the background
    Hidden,
}

/// Snapshot of the client published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStatus {
    /// Connection state
    pub state: ConnectionState,
    /// Whether the server confirmed the current connection
    pub is_connected: bool,
    /// Delay the next failure will wait
    pub retry_delay: Duration,
    /// Consecutive failures since the last `connected`
    pub consecutive_failures: u32,
    /// Current connection, opening or live
    pub connection_id: Option<ConnectionId>,
    /// Last credential failure, cleared on `connected`
    pub error: Option<CredentialError>,
}
