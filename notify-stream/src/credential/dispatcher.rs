//! Single-flight credential dispatcher.

use super::cache::CredentialCache;
use super::metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
use super::source::CredentialSource;
use super::types::{AcquireOptions, Credential, IssuedToken};
use crate::config::{ConfigValidationError, CredentialConfig};
use crate::error::{CredentialError, SourceError};
use crate::logging::{CredentialLogEvent, log_credential_event};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

type Acquisition = BoxFuture<'static, Result<Credential, CredentialError>>;

// The slot only holds a weak handle: if every waiter gives up, the
// acquisition is dropped and the next caller starts a new one.
struct InFlight {
    id: u64,
    acquisition: WeakShared<Acquisition>,
}

struct Inner {
    source: Arc<dyn CredentialSource>,
    config: CredentialConfig,
    cache: CredentialCache,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
    current: watch::Sender<Option<Credential>>,
    metrics: DispatcherMetrics,
}

enum Ticket {
    Cached(Credential),
    Pending(Shared<Acquisition>),
}

/// Hands out bearer credentials.
///
/// Cloning is cheap and every clone shares the same cache, in-flight slot and
/// current-credential slot.
#[derive(Clone)]
pub struct CredentialDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDispatcher")
            .field("config", &self.inner.config)
            .field("metrics", &self.inner.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

impl CredentialDispatcher {
    /// Create a dispatcher over `source`.
    ///
    /// Returns an error if `config` fails [`CredentialConfig::validate`].
    pub fn new(
        source: impl CredentialSource + 'static,
        config: CredentialConfig,
    ) -> Result<Self, ConfigValidationError> {
        Self::from_arc(Arc::new(source), config)
    }

    /// Create a dispatcher over a shared source.
    pub fn from_arc(
        source: Arc<dyn CredentialSource>,
        config: CredentialConfig,
    ) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        let (current, _) = watch::channel(None);
        Ok(Self {
            inner: Arc::new(Inner {
                source,
                config,
                cache: CredentialCache::new(),
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(0),
                current,
                metrics: DispatcherMetrics::new(),
            }),
        })
    }

    /// Get a credential.
    ///
    /// A fresh cached credential is returned without I/O unless
    /// `force_refresh` is set. Concurrent callers share one acquisition,
    /// including forced refreshes that arrive while it is in flight.
    pub async fn get_token(&self, force_refresh: bool) -> Result<Credential, CredentialError> {
        if !force_refresh {
            if let Some(credential) = self.inner.cache.get() {
                self.inner.metrics.record_cache_hit();
                log_credential_event(CredentialLogEvent::CacheHit);
                return Ok(credential);
            }
        }

        match self.join_or_start(force_refresh) {
            Ticket::Cached(credential) => Ok(credential),
            Ticket::Pending(acquisition) => acquisition.await,
        }
    }

    /// Invalidate the cached credential and the current slot.
    pub fn clear_token(&self) {
        self.inner.cache.clear();
        self.inner.current.send_replace(None);
        log_credential_event(CredentialLogEvent::Cleared);
    }

    /// The last acquired credential, if it is still fresh.
    pub fn current(&self) -> Option<Credential> {
        self.inner
            .current
            .borrow()
            .as_ref()
            .filter(|credential| !credential.is_expired())
            .cloned()
    }

    /// Watch the current-credential slot.
    pub fn subscribe_current(&self) -> watch::Receiver<Option<Credential>> {
        self.inner.current.subscribe()
    }

    /// Snapshot of dispatcher counters.
    pub fn metrics(&self) -> DispatcherMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The configuration in use.
    pub fn config(&self) -> &CredentialConfig {
        &self.inner.config
    }

    fn join_or_start(&self, force_refresh: bool) -> Ticket {
        let mut slot = self.inner.lock_in_flight();

        if let Some(acquisition) = slot.as_ref().and_then(|f| f.acquisition.upgrade()) {
            self.inner.metrics.record_joined();
            log_credential_event(CredentialLogEvent::Joined);
            return Ticket::Pending(acquisition);
        }

        // Another acquisition may have completed between the caller's cache
        // check and taking the lock.
        if !force_refresh {
            if let Some(credential) = self.inner.cache.get() {
                self.inner.metrics.record_cache_hit();
                return Ticket::Cached(credential);
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let acquisition: Acquisition = async move {
            let _slot = SlotGuard {
                inner: Arc::clone(&inner),
                id,
            };
            inner.acquire_with_retry(force_refresh).await
        }
        .boxed();
        let acquisition = acquisition.shared();

        self.inner.metrics.record_acquisition();
        *slot = acquisition.downgrade().map(|weak| InFlight {
            id,
            acquisition: weak,
        });
        Ticket::Pending(acquisition)
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire_with_retry(&self, force_refresh: bool) -> Result<Credential, CredentialError> {
        let max_attempts = self.config.max_attempts();
        let mut bypass_cache = force_refresh;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.metrics.record_attempt();
            log_credential_event(CredentialLogEvent::AttemptStarted {
                attempt,
                bypass_cache,
            });

            let options = AcquireOptions {
                bypass_cache,
                attempt,
            };
            let result =
                match tokio::time::timeout(self.config.attempt_timeout, self.source.acquire(options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::timeout(self.config.attempt_timeout)),
                };

            let err = match result {
                Ok(issued) => return Ok(self.store(issued, attempt)),
                Err(err) => err,
            };

            log_credential_event(CredentialLogEvent::AttemptFailed {
                attempt,
                kind: err.kind.to_string(),
                message: err.message.clone(),
            });
            if err.kind.requires_cache_bypass() {
                bypass_cache = true;
            }

            if !err.kind.is_retryable() || attempt >= max_attempts {
                self.cache.clear();
                self.current.send_replace(None);
                self.metrics.record_failure();
                log_credential_event(CredentialLogEvent::Exhausted {
                    attempts: attempt,
                    kind: err.kind.to_string(),
                });
                return Err(CredentialError::new(attempt, err));
            }

            tokio::time::sleep(self.config.retry_base_delay * attempt).await;
        }
    }

    fn store(&self, issued: IssuedToken, attempts: u32) -> Credential {
        let lifetime = match issued.expires_in {
            Some(expires_in) => self
                .config
                .cache_duration
                .min(expires_in.saturating_sub(self.config.expiry_skew)),
            None => self.config.cache_duration,
        };

        let credential = Credential::new(issued.token, lifetime);
        self.cache.set(credential.clone());
        self.current.send_replace(Some(credential.clone()));
        log_credential_event(CredentialLogEvent::Acquired {
            attempts,
            lifetime_ms: lifetime.as_millis() as u64,
        });
        credential
    }
}

// Clears the in-flight slot when the acquisition finishes or is dropped.
struct SlotGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.inner.lock_in_flight();
        if slot.as_ref().is_some_and(|f| f.id == self.id) {
            *slot = None;
        }
    }
}
