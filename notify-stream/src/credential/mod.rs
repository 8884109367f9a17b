//! Credential acquisition with caching, single-flight and retries.
//!
//! The [`CredentialDispatcher`] is the single place bearer tokens come from.
//! It serves a cached credential while it is fresh, collapses concurrent
//! acquisitions into one request to the [`CredentialSource`], and retries
//! transient failures with a linearly growing delay.
//!
//! # Example
//! ```rust,ignore
//! use notify_stream::credential::{CredentialDispatcher, HttpCredentialSource};
//! use notify_stream::CredentialConfig;
//!
//! let config = CredentialConfig::new().with_audience("https://api.example.org");
//! let source = HttpCredentialSource::new("https://app.example.org/auth/token", &config);
//! let dispatcher = CredentialDispatcher::new(source, config)?;
//!
//! let credential = dispatcher.get_token(false).await?;
//! ```

mod cache;
mod dispatcher;
mod metrics;
mod source;
mod types;

pub use cache::CredentialCache;
pub use dispatcher::CredentialDispatcher;
pub use metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
pub use source::{
    CredentialSource, HttpCredentialSource, StaticCredentialSource, classify_failure,
};
pub use types::{AcquireOptions, BearerToken, Credential, IssuedToken};
