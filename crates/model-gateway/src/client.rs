//! HTTP gateway client.

use crate::error::GatewayError;
use crate::types::*;
use crate::{GatewayEventStream, GenerationGateway};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use stream_protocol::FrameDecoder;
use tracing::{debug, instrument, warn};

/// Streaming HTTP client for the generation gateway.
///
/// The API key is stored as a `SecretString` to keep it out of logs and
/// debug output.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl HttpGateway {
    /// Create a new gateway client.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: SecretString::new(api_key.into()),
            model: model.into(),
        })
    }

    /// The configured default model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract error information from a failed response.
    async fn extract_error(response: reqwest::Response) -> GatewayError {
        let status = response.status();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Gateway rate limit exceeded");
                GatewayError::RateLimit
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Gateway authentication failed");
                GatewayError::Unauthorized
            }
            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".into());
                GatewayError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}

#[async_trait]
impl GenerationGateway for HttpGateway {
    #[instrument(skip(self, request), fields(message_count = request.messages.len()))]
    async fn stream_generation(
        &self,
        mut request: GatewayRequest,
    ) -> Result<GatewayEventStream, GatewayError> {
        if request.model.is_none() {
            request.model = Some(self.model.clone());
        }
        request.stream = true;

        let response = self
            .client
            .post(format!("{}/v1/generations", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::extract_error(response).await);
        }

        let mut body = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder: FrameDecoder<GatewayEvent> = FrameDecoder::new();

            while let Some(next) = body.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(GatewayError::Http(e));
                        return;
                    }
                };

                let events = match decoder.feed(&bytes) {
                    Ok(events) => events,
                    Err(e) => {
                        yield Err(GatewayError::Protocol(e));
                        return;
                    }
                };

                for event in events {
                    match event {
                        GatewayEvent::Error { message } => {
                            yield Err(GatewayError::Upstream(message));
                            return;
                        }
                        GatewayEvent::Finish { .. } => {
                            debug!("Gateway stream finished");
                            yield Ok(event);
                            return;
                        }
                        event => yield Ok(event),
                    }
                }
            }

            // Body ended without a finish event.
            yield Err(GatewayError::Upstream(
                "Stream ended without a finish event".into(),
            ));
        };

        Ok(Box::pin(stream))
    }
}
