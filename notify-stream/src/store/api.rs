//! REST client for the notifications collaborator API.

use crate::credential::CredentialDispatcher;
use crate::error::CredentialError;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const NOTIFICATIONS_PATH: &str = "/api/v1/notifications";

/// Failure of a notifications API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential could be obtained
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// The request did not complete
    #[error("request failed: {0}")]
    Network(String),
    /// The API answered with a non-success status
    #[error("notifications API returned HTTP {0}")]
    Status(u16),
    /// The response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),
    /// The request URL could not be built
    #[error("invalid URL: {0}")]
    Url(String),
    /// A notification id that cannot name a single path segment
    #[error("invalid notification id {0:?}")]
    InvalidId(String),
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification id
    pub id: String,
    /// Notification type, e.g. `comment` or `follow`
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Short title
    #[serde(default)]
    pub title: Option<String>,
    /// Body text
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    /// Whether the user has read it
    #[serde(default, alias = "isRead", alias = "read")]
    pub is_read: bool,
    /// Creation time
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    /// Type-specific data
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Wrapped {
        #[serde(alias = "data")]
        notifications: Vec<Notification>,
    },
    Bare(Vec<Notification>),
}

#[derive(Debug, Deserialize)]
struct UnreadCountBody {
    #[serde(alias = "unreadCount", alias = "count")]
    unread_count: u64,
}

/// Client for `/api/v1/notifications`.
///
/// Requests carry a bearer credential from the dispatcher. A 401 is retried
/// once with a forced refresh.
#[derive(Debug, Clone)]
pub struct NotificationsApi {
    client: reqwest::Client,
    base_url: Url,
    dispatcher: CredentialDispatcher,
}

impl NotificationsApi {
    /// Create a client for the API at `base_url` (scheme, host and port).
    pub fn new(base_url: Url, dispatcher: CredentialDispatcher) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            dispatcher,
        }
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// List the user's notifications.
    pub async fn list(&self) -> Result<Vec<Notification>, ApiError> {
        let response = self.send(Method::GET, self.endpoint(&[])?).await?;
        let body: ListBody = decode(response).await?;
        Ok(match body {
            ListBody::Wrapped { notifications } | ListBody::Bare(notifications) => notifications,
        })
    }

    /// Number of unread notifications.
    pub async fn unread_count(&self) -> Result<u64, ApiError> {
        let response = self
            .send(Method::GET, self.endpoint(&["unread-count"])?)
            .await?;
        let body: UnreadCountBody = decode(response).await?;
        Ok(body.unread_count)
    }

    /// Mark every notification as read.
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.send(Method::PUT, self.endpoint(&["mark-all-read"])?)
            .await
            .map(drop)
    }

    /// Mark one notification as read.
    pub async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        self.send(Method::PUT, self.endpoint(&[checked_id(id)?, "read"])?)
            .await
            .map(drop)
    }

    /// Delete one notification.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, self.endpoint(&[checked_id(id)?])?)
            .await
            .map(drop)
    }

    // Segments are percent-encoded, so `/`, `?` and `#` stay inside them.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self
            .base_url
            .join(NOTIFICATIONS_PATH)
            .map_err(|err| ApiError::Url(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Url(format!("{} cannot carry a path", self.base_url)))?
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response, ApiError> {
        let credential = self.dispatcher.get_token(false).await?;
        let response = self.request(method.clone(), &url, credential.token().expose()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response);
        }

        tracing::debug!(path = %url.path(), "Notifications API rejected credential, refreshing");
        let credential = self.dispatcher.get_token(true).await?;
        let response = self.request(method, &url, credential.token().expose()).await?;
        check(response)
    }

    async fn request(
        &self,
        method: Method,
        url: &Url,
        token: &str,
    ) -> Result<reqwest::Response, ApiError> {
        self.client
            .request(method, url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| ApiError::Network(err.without_url().to_string()))
    }
}

fn checked_id(id: &str) -> Result<&str, ApiError> {
    if matches!(id, "" | "." | "..") {
        Err(ApiError::InvalidId(id.to_string()))
    } else {
        Ok(id)
    }
}

fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status(status.as_u16()))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    response
        .json()
        .await
        .map_err(|err| ApiError::Decode(err.without_url().to_string()))
}
