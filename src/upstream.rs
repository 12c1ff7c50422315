//! Upstream Messages transport.
//!
//! Owns the shared HTTP client, the upstream base URL and the token
//! provider. The translation core never sees how tokens are minted; it
//! hands a `MessagesRequest` in and gets either a parsed response or a
//! decoded SSE event stream back.

use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use tracing::warn;

use crate::constants::ANTHROPIC_VERSION;
use crate::error::RelayError;
use crate::schema::anthropic::{MessagesRequest, MessagesResponse, StreamEvent};

/// Mints bearer tokens for upstream calls.
///
/// Implementations are shared across requests and must synchronize any
/// refresh internally.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, RelayError>;
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    auth: Arc<dyn TokenProvider>,
}

impl UpstreamClient {
    pub fn new(http: Client, base_url: impl Into<String>, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth,
        }
    }

    async fn post_messages(
        &self,
        body: &MessagesRequest,
        stream: bool,
    ) -> Result<reqwest::Response, RelayError> {
        let token = self.auth.bearer_token().await?;
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("accept", accept)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::from_upstream_body(status, &text));
        }
        Ok(response)
    }

    /// Buffered call: one request, one parsed response.
    pub async fn send(&self, body: &MessagesRequest) -> Result<MessagesResponse, RelayError> {
        let response = self.post_messages(body, false).await?;
        response
            .json()
            .await
            .map_err(|e| RelayError::Decode(e.to_string()))
    }

    /// Streaming call: the response body decoded into typed SSE events.
    ///
    /// Undecodable event payloads are skipped (forward compatibility);
    /// transport breaks surface as errors. Dropping the stream releases
    /// the upstream connection.
    pub async fn send_streaming(
        &self,
        body: &MessagesRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, RelayError>>, RelayError> {
        let response = self.post_messages(body, true).await?;

        let events = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) => match serde_json::from_str::<StreamEvent>(&event.data) {
                        Ok(parsed) => Some(Ok(parsed)),
                        Err(e) => {
                            warn!(event = %event.event, error = %e, "skipping undecodable upstream event");
                            None
                        }
                    },
                    Err(e) => Some(Err(RelayError::Stream(e.to_string()))),
                }
            });

        Ok(events.boxed())
    }
}
