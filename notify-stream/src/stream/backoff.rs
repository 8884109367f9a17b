// Exponential reconnect backoff

use crate::config::StreamConfig;
use std::time::Duration;

/// Reconnect delay that grows geometrically per consecutive failure.
///
/// The first failure waits `initial`, each following one `multiplier` times
/// longer, never more than `max`. [`reset`](Self::reset) returns to
/// `initial` once a connection is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    /// Create a backoff.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max,
            multiplier,
            current: initial.min(max),
            failures: 0,
        }
    }

    /// Create a backoff from client configuration.
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.initial_retry_delay,
            config.max_retry_delay,
            config.backoff_multiplier,
        )
    }

    /// Record a failure and return the delay to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
        self.failures = 0;
    }

    /// Delay the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
