//! Configuration for the notification pipeline.
//!
//! Three independent sections, each with defaults matching the deployed
//! behaviour and a builder for overrides:
//!
//! - [`CredentialConfig`] - token caching, per-attempt timeout and retries
//! - [`StreamConfig`] - client reconnection policy and liveness
//! - [`ServerConfig`] - heartbeat and proactive reconnect on the endpoint
//!
//! [`NotifyConfig`] bundles all three.
//!
//! # Example
//! ```rust,ignore
//! use notify_stream::{NotifyConfig, ServerConfig};
//! use std::time::Duration;
//!
//! let config = NotifyConfig::default().with_server(
//!     ServerConfig::new().with_reconnect_after(Duration::from_secs(240)),
//! );
//! config.validate()?;
//! ```

use std::fmt;
use std::time::Duration;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// A duration that must be positive was zero
    ZeroDuration(&'static str),
    /// backoff_multiplier must be finite and at least 1.0
    InvalidMultiplier,
    /// max_retry_delay must be at least initial_retry_delay
    RetryCapBelowInitial,
    /// heartbeat_interval must be shorter than reconnect_after
    HeartbeatNotBeforeReconnect,
    /// A channel capacity was zero
    ZeroCapacity(&'static str),
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDuration(field) => write!(f, "{} must be greater than 0", field),
            Self::InvalidMultiplier => {
                write!(f, "backoff_multiplier must be finite and at least 1.0")
            }
            Self::RetryCapBelowInitial => {
                write!(f, "max_retry_delay must be at least initial_retry_delay")
            }
            Self::HeartbeatNotBeforeReconnect => {
                write!(f, "heartbeat_interval must be shorter than reconnect_after")
            }
            Self::ZeroCapacity(field) => write!(f, "{} must be greater than 0", field),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

fn non_zero(value: Duration, field: &'static str) -> Result<(), ConfigValidationError> {
    if value.is_zero() {
        Err(ConfigValidationError::ZeroDuration(field))
    } else {
        Ok(())
    }
}

// =============================================================================
// Credential Configuration
// =============================================================================

/// Configuration for the credential dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialConfig {
    /// How long an acquired credential is served from cache (default: 5 minutes)
    pub cache_duration: Duration,
    /// Margin subtracted from a provider-reported lifetime (default: 30s)
    pub expiry_skew: Duration,
    /// Upper bound for a single acquisition attempt (default: 20s)
    pub attempt_timeout: Duration,
    /// Retries after the first failed attempt (default: 2, so 3 attempts)
    pub max_retries: u32,
    /// Delay unit between attempts, multiplied by the attempt number (default: 1s)
    pub retry_base_delay: Duration,
    /// Audience requested from the identity provider
    pub audience: Option<String>,
    /// Scope requested from the identity provider
    pub scope: Option<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(5 * 60),
            expiry_skew: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            audience: None,
            scope: None,
        }
    }
}

impl CredentialConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache lifetime
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    /// Set the expiry skew
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the retry bound
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay unit between attempts
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the requested audience
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the requested scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Total attempts per acquisition.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        non_zero(self.cache_duration, "cache_duration")?;
        non_zero(self.attempt_timeout, "attempt_timeout")?;
        Ok(())
    }
}

// =============================================================================
// Stream Client Configuration
// =============================================================================

/// Configuration for the event stream client.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// First reconnect delay after a failure (default: 1s)
    pub initial_retry_delay: Duration,
    /// Cap for the reconnect delay (default: 30s)
    pub max_retry_delay: Duration,
    /// Growth factor per consecutive failure (default: 1.5)
    pub backoff_multiplier: f64,
    /// Fixed delay before reopening after a server reconnect request (default: 1s)
    pub graceful_reconnect_delay: Duration,
    /// Delay before the first attempt after start, enable or login (default: 500ms)
    pub mount_delay: Duration,
    /// Treat the connection as dead after this long without a frame
    /// (default: 90s, three heartbeats). `None` disables the watchdog.
    pub idle_timeout: Option<Duration>,
    /// Capacity of the event broadcast channel (default: 256)
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            graceful_reconnect_delay: Duration::from_secs(1),
            mount_delay: Duration::from_millis(500),
            idle_timeout: Some(Duration::from_secs(90)),
            event_buffer: 256,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial and maximum reconnect delays
    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_retry_delay = initial;
        self.max_retry_delay = max;
        self
    }

    /// Set the backoff growth factor
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the delay used after a server reconnect request
    pub fn with_graceful_reconnect_delay(mut self, delay: Duration) -> Self {
        self.graceful_reconnect_delay = delay;
        self
    }

    /// Set the delay before the first attempt
    pub fn with_mount_delay(mut self, delay: Duration) -> Self {
        self.mount_delay = delay;
        self
    }

    /// Set or disable the liveness watchdog
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        non_zero(self.initial_retry_delay, "initial_retry_delay")?;
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigValidationError::InvalidMultiplier);
        }
        if self.max_retry_delay < self.initial_retry_delay {
            return Err(ConfigValidationError::RetryCapBelowInitial);
        }
        if let Some(timeout) = self.idle_timeout {
            non_zero(timeout, "idle_timeout")?;
        }
        if self.event_buffer == 0 {
            return Err(ConfigValidationError::ZeroCapacity("event_buffer"));
        }
        Ok(())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interval between `ping` events (default: 30s)
    pub heartbeat_interval: Duration,
    /// Session age at which a `reconnect` event is sent and the response ends.
    /// Keep it below the hosting platform's hard connection ceiling
    /// (default: 9 minutes).
    pub reconnect_after: Duration,
    /// Broadcast capacity per user stream (default: 256)
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_after: Duration::from_secs(9 * 60),
            channel_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the proactive reconnect deadline
    pub fn with_reconnect_after(mut self, after: Duration) -> Self {
        self.reconnect_after = after;
        self
    }

    /// Set the per-stream channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        non_zero(self.heartbeat_interval, "heartbeat_interval")?;
        non_zero(self.reconnect_after, "reconnect_after")?;
        if self.heartbeat_interval >= self.reconnect_after {
            return Err(ConfigValidationError::HeartbeatNotBeforeReconnect);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigValidationError::ZeroCapacity("channel_capacity"));
        }
        Ok(())
    }
}

// =============================================================================
// Combined Configuration
// =============================================================================

/// All pipeline configuration in one place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyConfig {
    /// Credential dispatcher settings
    pub credential: CredentialConfig,
    /// Stream client settings
    pub stream: StreamConfig,
    /// Stream endpoint settings
    pub server: ServerConfig,
}

impl NotifyConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the credential section
    pub fn with_credential(mut self, config: CredentialConfig) -> Self {
        self.credential = config;
        self
    }

    /// Replace the stream section
    pub fn with_stream(mut self, config: StreamConfig) -> Self {
        self.stream = config;
        self
    }

    /// Replace the server section
    pub fn with_server(mut self, config: ServerConfig) -> Self {
        self.server = config;
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.credential.validate()?;
        self.stream.validate()?;
        self.server.validate()
    }
}
