//! OpenAI Chat Completions provider.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::adapters::providers::error::HttpApiError;
use crate::domain::errors::ProviderError;
use crate::domain::models::{OpenAiSettings, RoleBinding};
use crate::domain::ports::CompletionProvider;

/// Message in the chat format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the sender ("system" or "user")
    pub role: String,
    /// Message text
    pub content: String,
}

/// Request to the Chat Completions API.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Response from the Chat Completions API.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Generated choices; only the first is used
    pub choices: Vec<Choice>,
}

/// One generated choice.
#[derive(Debug, Deserialize)]
pub struct Choice {
    /// Generated message
    pub message: ChoiceMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message inside a choice.
#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    /// Message text; absent for refusals and tool calls
    #[serde(default)]
    pub content: Option<String>,
}

/// Completion provider backed by the OpenAI Chat Completions API.
pub struct OpenAiProvider {
    settings: OpenAiSettings,
    client: Client,
}

impl OpenAiProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ProviderError::fatal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { settings, client })
    }

    fn api_key(&self) -> Option<String> {
        self.settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    fn build_request(prompt: &str, input: &str, role: &RoleBinding) -> ChatRequest {
        let messages = if input.trim().is_empty() {
            vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }]
        } else {
            vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: input.to_string(),
                },
            ]
        };

        ChatRequest {
            model: role.model.model.clone(),
            messages,
            max_tokens: role.model.max_tokens,
            temperature: role.model.temperature,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, HttpApiError> {
        let api_key = self.api_key().ok_or_else(|| {
            HttpApiError::AuthenticationFailed("OPENAI_API_KEY not set".to_string())
        })?;

        let response = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.settings.base_url.trim_end_matches('/')
            ))
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpApiError::from_status(status, body));
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| HttpApiError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| HttpApiError::InvalidResponse("response has no choices".to_string()))?;
        debug!(finish_reason = ?choice.finish_reason, "openai response received");

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(
        &self,
        prompt: &str,
        input: &str,
        role: &RoleBinding,
    ) -> Result<String, ProviderError> {
        let request = Self::build_request(prompt, input, role);
        debug!(role = %role.role, model = %request.model, "openai request");
        Ok(self.send(&request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ModelConfig, Role};
    use mockito::{Matcher, Server};

    fn binding() -> RoleBinding {
        RoleBinding::new(Role::PromptOptimizer, ModelConfig::openai("gpt-4o"))
    }

    fn provider(base_url: String) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiSettings {
            api_key: Some("sk-test".to_string()),
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_build_request_system_and_user() {
        let request = OpenAiProvider::build_request("Classify.", "great", &binding());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, "great");

        let request = OpenAiProvider::build_request("Improve this prompt.", "", &binding());
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "model": "gpt-4o" }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "negative" },
                        "finish_reason": "stop"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let text = provider(server.url())
            .complete("Classify.", "awful", &binding())
            .await
            .unwrap();

        assert_eq!(text, "negative");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let err = provider(server.url())
            .complete("Classify.", "x", &binding())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_not_found_is_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(404)
            .with_body(r#"{"error":{"message":"model not found"}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .complete("Classify.", "x", &binding())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
