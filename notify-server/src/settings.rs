//! Environment configuration.
//!
//! | Variable                      | Default          |
//! |-------------------------------|------------------|
//! | `NOTIFY_BIND`                 | `127.0.0.1:8080` |
//! | `NOTIFY_HEARTBEAT_SECS`       | `30`             |
//! | `NOTIFY_RECONNECT_AFTER_SECS` | `540`            |
//! | `NOTIFY_CHANNEL_CAPACITY`     | `256`            |
//! | `NOTIFY_TOKENS`               | empty            |
//!
//! `NOTIFY_TOKENS` lists accepted bearer tokens as `token:user_id` pairs
//! separated by commas.

use notify_stream::config::{ConfigValidationError, ServerConfig};
use notify_stream::server::StaticTokenVerifier;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{name} has invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
    #[error("NOTIFY_TOKENS entry `{0}` is not `token:user_id`")]
    TokenEntry(String),
    #[error(transparent)]
    Config(#[from] ConfigValidationError),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub server: ServerConfig,
    pub tokens: Vec<(String, String)>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let bind = parse_or(&lookup, "NOTIFY_BIND", || {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        })?;

        let defaults = ServerConfig::default();
        let heartbeat = parse_or(&lookup, "NOTIFY_HEARTBEAT_SECS", || {
            defaults.heartbeat_interval.as_secs()
        })?;
        let reconnect_after = parse_or(&lookup, "NOTIFY_RECONNECT_AFTER_SECS", || {
            defaults.reconnect_after.as_secs()
        })?;
        let capacity = parse_or(&lookup, "NOTIFY_CHANNEL_CAPACITY", || {
            defaults.channel_capacity
        })?;

        let server = ServerConfig::new()
            .with_heartbeat_interval(Duration::from_secs(heartbeat))
            .with_reconnect_after(Duration::from_secs(reconnect_after))
            .with_channel_capacity(capacity);
        server.validate()?;

        let tokens = match lookup("NOTIFY_TOKENS") {
            Some(raw) => parse_tokens(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            bind,
            server,
            tokens,
        })
    }

    pub fn verifier(&self) -> StaticTokenVerifier {
        self.tokens.iter().cloned().collect()
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: impl FnOnce() -> T,
) -> Result<T, SettingsError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| SettingsError::Invalid { name, value }),
        None => Ok(default()),
    }
}

fn parse_tokens(raw: &str) -> Result<Vec<(String, String)>, SettingsError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                Ok((token.to_string(), user.to_string()))
            }
            _ => Err(SettingsError::TokenEntry(entry.to_string())),
        })
        .collect()
}
