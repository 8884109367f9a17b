// Counters for the credential dispatcher

use std::sync::atomic::{AtomicU64, Ordering};

/// Credential dispatcher counters.
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    cache_hits: AtomicU64,
    acquisitions: AtomicU64,
    attempts: AtomicU64,
    failures: AtomicU64,
    joined: AtomicU64,
}

impl DispatcherMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request served from cache
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new acquisition being started
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one call to the credential source
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquisition that exhausted its retries
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a caller that joined an in-flight acquisition
    pub fn record_joined(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher metrics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherMetricsSnapshot {
    /// Requests served from cache
    pub cache_hits: u64,
    /// Acquisitions started
    pub acquisitions: u64,
    /// Calls made to the credential source
    pub attempts: u64,
    /// Acquisitions that failed after all retries
    pub failures: u64,
    /// Callers deduplicated onto an in-flight acquisition
    pub joined: u64,
}
