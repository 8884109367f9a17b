//! Push connection transport.

use super::sse::{SseDecoder, SseFrame};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::pin::Pin;

/// Decoded frames of one open connection.
///
/// The stream ends after yielding an error; a clean server close is reported
/// as [`TransportError::Closed`].
pub type EventSource = Pin<Box<dyn Stream<Item = Result<SseFrame, TransportError>> + Send>>;

/// Opens push connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`. The URL already carries the credential.
    async fn open(&self, url: &Url) -> Result<EventSource, TransportError>;
}

/// Server-sent events over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client. It must not set a total request
    /// timeout, or long-lived streams will be cut.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &Url) -> Result<EventSource, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|err| TransportError::Network(err.without_url().to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let mut body = response.bytes_stream();
        let frames = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        for frame in decoder.feed(&chunk) {
                            yield Ok(frame);
                        }
                    }
                    Some(Err(err)) => {
                        yield Err(TransportError::Network(err.without_url().to_string()));
                        break;
                    }
                    None => {
                        yield Err(TransportError::Closed);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(frames))
    }
}
