//! HTTP chat completion client.

use catalog_core::{async_trait, ChatProvider, ChatRequest, RawReply, TransportError};
use reqwest::Client;
use tracing::{debug, warn};

use crate::api_types::ChatCompletionRequest;
use crate::config::GroqClientConfig;
use crate::error::ProviderError;

/// A [`ChatProvider`] that posts to an OpenAI-compatible endpoint.
///
/// The client never interprets the reply; see [`crate::classify`].
pub struct GroqClient {
    client: Client,
    config: GroqClientConfig,
}

impl GroqClient {
    /// Create a new client with the given configuration.
    pub fn new(config: GroqClientConfig) -> Result<Self, ProviderError> {
        if config.endpoint.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "provider endpoint is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        debug!("GroqClient initialized for endpoint: {}", config.endpoint);

        Ok(Self { client, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &GroqClientConfig {
        &self.config
    }
}

#[async_trait]
impl ChatProvider for GroqClient {
    async fn send(&self, request: ChatRequest) -> Result<RawReply, TransportError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %request.model, max_tokens = request.max_tokens, "sending chat completion");

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(request.timeout)
            .header("Authorization", self.config.auth.header_value(&request.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, &request))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, &request))?;

        debug!(model = %request.model, status, bytes = text.len(), "chat completion answered");

        Ok(RawReply::new(status, text))
    }

    fn name(&self) -> &str {
        "groq"
    }
}

fn transport_error(err: reqwest::Error, request: &ChatRequest) -> TransportError {
    if err.is_timeout() {
        warn!(model = %request.model, timeout = ?request.timeout, "provider request timed out");
        TransportError::Timeout(request.timeout)
    } else {
        warn!(model = %request.model, "provider request failed: {}", err);
        TransportError::Network(err.to_string())
    }
}
