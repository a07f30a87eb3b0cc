//! Anthropic Messages API provider.
//!
//! The candidate prompt is sent as the system prompt and the test input as
//! the user message. Meta prompts carry no input, so the prompt itself
//! becomes the user message.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::adapters::providers::error::HttpApiError;
use crate::domain::errors::ProviderError;
use crate::domain::models::{AnthropicSettings, RoleBinding};
use crate::domain::ports::CompletionProvider;

/// Message in the Anthropic conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender ("user" or "assistant")
    pub role: String,
    /// Message text
    pub content: String,
}

/// Request to the Anthropic Messages API.
#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Sampling temperature (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Content block in a response; only text blocks are used.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Generated text
    #[serde(rename = "text")]
    Text {
        /// Text content
        text: String,
    },
    /// Any non-text block
    #[serde(other)]
    Other,
}

/// Response from the Anthropic Messages API.
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    /// Response content blocks
    pub content: Vec<ContentBlock>,
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Completion provider backed by the Anthropic Messages API.
pub struct AnthropicProvider {
    settings: AnthropicSettings,
    client: Client,
}

impl AnthropicProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(settings: AnthropicSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ProviderError::fatal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { settings, client })
    }

    /// API key from settings, falling back to ANTHROPIC_API_KEY.
    fn api_key(&self) -> Option<String> {
        self.settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }

    fn build_request(prompt: &str, input: &str, role: &RoleBinding) -> MessagesRequest {
        let (system, user) = if input.trim().is_empty() {
            (None, prompt.to_string())
        } else {
            (Some(prompt.to_string()), input.to_string())
        };

        MessagesRequest {
            model: role.model.model.clone(),
            max_tokens: role.model.max_tokens,
            system,
            messages: vec![Message {
                role: "user".to_string(),
                content: user,
            }],
            temperature: role.model.temperature,
        }
    }

    async fn send(&self, request: &MessagesRequest) -> Result<String, HttpApiError> {
        let api_key = self.api_key().ok_or_else(|| {
            HttpApiError::AuthenticationFailed("ANTHROPIC_API_KEY not set".to_string())
        })?;

        let response = self
            .client
            .post(format!(
                "{}/v1/messages",
                self.settings.base_url.trim_end_matches('/')
            ))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", &self.settings.api_version)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpApiError::from_status(status, body));
        }

        let body = response.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| HttpApiError::InvalidResponse(e.to_string()))?;

        debug!(stop_reason = ?parsed.stop_reason, "anthropic response received");

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(
        &self,
        prompt: &str,
        input: &str,
        role: &RoleBinding,
    ) -> Result<String, ProviderError> {
        let request = Self::build_request(prompt, input, role);
        debug!(role = %role.role, model = %request.model, "anthropic request");
        Ok(self.send(&request).await?)
    }
}
