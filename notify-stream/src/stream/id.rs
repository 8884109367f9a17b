//! Connection identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

const PREFIX: &str = "conn_";

/// Error parsing a [`ConnectionId`].
#[derive(Debug, Error)]
pub enum IdParseError {
    /// The `conn_` prefix is missing
    #[error("connection id must start with `conn_`")]
    MissingPrefix,
    /// The remainder is not a UUID
    #[error("invalid connection id: {0}")]
    InvalidUuid(#[from] uuid::Error),
}

/// Time-ordered connection identifier based on UUID v7.
///
/// Assigned per push connection on the client and per session on the
/// server so both sides' logs can be correlated.
///
/// # Example
/// ```rust,ignore
/// let id = ConnectionId::new();
/// println!("{}", id); // conn_01934c4e-8f1a-7b3c-9d2e-5f6a7b8c9d0e
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse a prefixed connection ID.
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let uuid = s.strip_prefix(PREFIX).ok_or(IdParseError::MissingPrefix)?;
        Ok(Self(Uuid::parse_str(uuid)?))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
