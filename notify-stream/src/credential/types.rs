//! Credential value types.

use crate::logging::DEFAULT_REDACTION_REPLACEMENT;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque bearer string.
///
/// `Debug` never prints the value; call [`BearerToken::expose`] where the raw
/// token is actually needed on the wire.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BearerToken(Arc<str>);

impl BearerToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// The raw token value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken")
            .field(&DEFAULT_REDACTION_REPLACEMENT)
            .finish()
    }
}

impl From<&str> for BearerToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BearerToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A cached bearer credential with its derived expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    token: BearerToken,
    cached_at: Instant,
    expires_at: Instant,
}

impl Credential {
    /// Create a credential cached now and valid for `lifetime`.
    pub fn new(token: BearerToken, lifetime: Duration) -> Self {
        let cached_at = Instant::now();
        Self {
            token,
            cached_at,
            expires_at: cached_at + lifetime,
        }
    }

    /// The bearer token.
    pub fn token(&self) -> &BearerToken {
        &self.token
    }

    /// When the credential was cached.
    pub fn cached_at(&self) -> Instant {
        self.cached_at
    }

    /// When the credential stops being served from cache.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the derived expiry has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before expiry.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// A token as returned by a credential source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// The bearer token
    pub token: BearerToken,
    /// Lifetime reported by the provider, if any
    pub expires_in: Option<Duration>,
}

impl IssuedToken {
    /// Create a token without a reported lifetime.
    pub fn new(token: impl Into<BearerToken>) -> Self {
        Self {
            token: token.into(),
            expires_in: None,
        }
    }

    /// Set the provider-reported lifetime.
    #[must_use]
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }
}

/// Per-attempt options passed to a credential source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Ask the provider to skip its own cache and mint fresh material
    pub bypass_cache: bool,
    /// 1-based attempt number within the current acquisition
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_debug_is_redacted() {
        let token = BearerToken::from("eyJhbGciOiJSUzI1NiJ9.secret");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(token.expose(), "eyJhbGciOiJSUzI1NiJ9.secret");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("tok-123".into(), Duration::from_secs(60));
        assert!(!format!("{:?}", credential).contains("tok-123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_expiry() {
        let credential = Credential::new("tok".into(), Duration::from_secs(10));
        assert!(!credential.is_expired());
        assert_eq!(credential.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(credential.is_expired());
        assert_eq!(credential.remaining(), Duration::ZERO);
    }
}
