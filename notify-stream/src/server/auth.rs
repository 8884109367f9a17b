//! Stream token verification.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// The authenticated owner of a stream session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// User the session belongs to
    pub user_id: String,
}

impl Principal {
    /// Create a principal.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The token is unknown, expired or malformed
    #[error("token rejected: {0}")]
    Rejected(String),
    /// Verification could not be performed
    #[error("token verification unavailable: {0}")]
    Unavailable(String),
}

/// Validates bearer tokens presented to the stream endpoint.
///
/// Token validation itself belongs to the identity provider; implementations
/// wrap whatever verification the deployment uses.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return its owner.
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError>;
}

/// Accepts a fixed set of tokens.
///
/// Useful for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    /// Create a verifier that accepts nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user_id`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }

    /// Number of accepted tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is accepted.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<T, U> FromIterator<(T, U)> for StaticTokenVerifier
where
    T: Into<String>,
    U: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (T, U)>>(iter: I) -> Self {
        Self {
            tokens: iter
                .into_iter()
                .map(|(token, user)| (token.into(), user.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        self.tokens
            .get(token)
            .map(Principal::new)
            .ok_or_else(|| VerifyError::Rejected("unknown token".into()))
    }
}
