//! Credential sources.
//!
//! A [`CredentialSource`] performs exactly one acquisition attempt. Caching,
//! deduplication, timeouts and retries are the dispatcher's job.

use super::types::{AcquireOptions, BearerToken, IssuedToken};
use crate::config::CredentialConfig;
use crate::error::{SourceError, SourceErrorKind};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

// =============================================================================
// Credential Source Trait
// =============================================================================

/// One acquisition attempt against an identity provider.
///
/// Implementations classify their failures with a [`SourceErrorKind`] so the
/// dispatcher can decide whether and how to retry.
///
/// # Example
///
/// ```rust,ignore
/// use notify_stream::credential::{AcquireOptions, CredentialSource, IssuedToken};
/// use notify_stream::SourceError;
///
/// struct EnvSource;
///
/// impl CredentialSource for EnvSource {
///     fn acquire(
///         &self,
///         _options: AcquireOptions,
///     ) -> Pin<Box<dyn Future<Output = Result<IssuedToken, SourceError>> + Send + '_>> {
///         Box::pin(async {
///             std::env::var("NOTIFY_TOKEN")
///                 .map(IssuedToken::new)
///                 .map_err(|_| SourceError::login_required("NOTIFY_TOKEN not set"))
///         })
///     }
/// }
/// ```
pub trait CredentialSource: Send + Sync {
    /// Perform one acquisition attempt.
    fn acquire(
        &self,
        options: AcquireOptions,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken, SourceError>> + Send + '_>>;
}

// =============================================================================
// Built-in Sources
// =============================================================================

/// Always returns the same token.
///
/// Useful for tests and local tooling.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    token: BearerToken,
    expires_in: Option<Duration>,
}

impl StaticCredentialSource {
    /// Create a source for a fixed token.
    pub fn new(token: impl Into<BearerToken>) -> Self {
        Self {
            token: token.into(),
            expires_in: None,
        }
    }

    /// Report a lifetime with every issued token.
    #[must_use]
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }
}

impl CredentialSource for StaticCredentialSource {
    fn acquire(
        &self,
        _options: AcquireOptions,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken, SourceError>> + Send + '_>> {
        Box::pin(async move {
            Ok(IssuedToken {
                token: self.token.clone(),
                expires_in: self.expires_in,
            })
        })
    }
}

/// Fetches tokens from the web app's silent renewal route.
///
/// Sends `audience`, `scope` and, when upstream caching must be skipped,
/// `cache=off` as query parameters. Expects a JSON body carrying the token as
/// `token`, `accessToken` or `access_token` and an optional lifetime in
/// seconds as `expiresIn`/`expires_in`.
#[derive(Debug, Clone)]
pub struct HttpCredentialSource {
    client: reqwest::Client,
    endpoint: String,
    audience: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "error_description")]
    message: Option<String>,
}

impl HttpCredentialSource {
    /// Create a source for `endpoint`, taking audience and scope from `config`.
    pub fn new(endpoint: impl Into<String>, config: &CredentialConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            audience: config.audience.clone(),
            scope: config.scope.clone(),
        }
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn query(&self, options: AcquireOptions) -> Vec<(&'static str, &str)> {
        let mut query = Vec::with_capacity(3);
        if let Some(audience) = self.audience.as_deref() {
            query.push(("audience", audience));
        }
        if let Some(scope) = self.scope.as_deref() {
            query.push(("scope", scope));
        }
        if options.bypass_cache {
            query.push(("cache", "off"));
        }
        query
    }

    async fn fetch(&self, options: AcquireOptions) -> Result<IssuedToken, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.query(options))
            .send()
            .await
            .map_err(|err| SourceError::transient(err.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let code = body.error.or(body.code);
            let kind = classify_failure(status.as_u16(), code.as_deref());
            let detail = body
                .message
                .or(code)
                .unwrap_or_else(|| status.to_string());
            return Err(SourceError::new(kind, detail));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| SourceError::invalid(err.without_url().to_string()))?;
        if body.token.is_empty() {
            return Err(SourceError::invalid("token endpoint returned an empty token"));
        }

        let mut issued = IssuedToken::new(body.token);
        if let Some(secs) = body.expires_in {
            issued = issued.with_expires_in(Duration::from_secs(secs));
        }
        Ok(issued)
    }
}

impl CredentialSource for HttpCredentialSource {
    fn acquire(
        &self,
        options: AcquireOptions,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken, SourceError>> + Send + '_>> {
        Box::pin(self.fetch(options))
    }
}

/// Classify a failed token endpoint response.
///
/// Provider error codes take precedence over the HTTP status.
pub fn classify_failure(status: u16, code: Option<&str>) -> SourceErrorKind {
    match code {
        Some("invalid_grant" | "missing_refresh_token") => SourceErrorKind::StaleRefresh,
        Some("login_required" | "consent_required" | "interaction_required") => {
            SourceErrorKind::LoginRequired
        }
        _ => match status {
            401 | 403 => SourceErrorKind::LoginRequired,
            408 | 429 | 500..=599 => SourceErrorKind::Transient,
            _ => SourceErrorKind::Invalid,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure_prefers_provider_code() {
        assert_eq!(
            classify_failure(400, Some("invalid_grant")),
            SourceErrorKind::StaleRefresh
        );
        assert_eq!(
            classify_failure(500, Some("missing_refresh_token")),
            SourceErrorKind::StaleRefresh
        );
        assert_eq!(
            classify_failure(400, Some("login_required")),
            SourceErrorKind::LoginRequired
        );
    }

    #[test]
    fn test_classify_failure_by_status() {
        assert_eq!(classify_failure(401, None), SourceErrorKind::LoginRequired);
        assert_eq!(classify_failure(403, None), SourceErrorKind::LoginRequired);
        assert_eq!(classify_failure(502, None), SourceErrorKind::Transient);
        assert_eq!(classify_failure(429, Some("slow_down")), SourceErrorKind::Transient);
        assert_eq!(classify_failure(404, None), SourceErrorKind::Invalid);
    }

    #[test]
    fn test_query_parameters() {
        let config = CredentialConfig::new()
            .with_audience("https://api.example.org")
            .with_scope("openid");
        let source = HttpCredentialSource::new("http://localhost/auth/token", &config);

        let query = source.query(AcquireOptions::default());
        assert_eq!(
            query,
            vec![("audience", "https://api.example.org"), ("scope", "openid")]
        );

        let query = source.query(AcquireOptions {
            bypass_cache: true,
            attempt: 2,
        });
        assert_eq!(query.last(), Some(&("cache", "off")));
    }

    #[test]
    fn test_token_response_aliases() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"abc","expiresIn":3600}"#).unwrap();
        assert_eq!(body.token, "abc");
        assert_eq!(body.expires_in, Some(3600));

        let body: TokenResponse = serde_json::from_str(r#"{"token":"xyz"}"#).unwrap();
        assert_eq!(body.expires_in, None);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source =
            StaticCredentialSource::new("fixed").with_expires_in(Duration::from_secs(60));
        let issued = source.acquire(AcquireOptions::default()).await.unwrap();
        assert_eq!(issued.token.expose(), "fixed");
        assert_eq!(issued.expires_in, Some(Duration::from_secs(60)));
    }
}
