//! Provider router: dispatches each call to the provider configured for its role.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use crate::domain::errors::ProviderError;
use crate::domain::models::{ProviderKind, ProvidersConfig, RoleBinding};
use crate::domain::ports::CompletionProvider;

use super::anthropic::AnthropicProvider;
use super::openai::OpenAiProvider;

/// Routes completions by `role.model.provider`.
#[derive(Clone)]
pub struct ProviderRouter {
    anthropic: Option<Arc<dyn CompletionProvider>>,
    openai: Option<Arc<dyn CompletionProvider>>,
}

impl ProviderRouter {
    /// Router with no backends registered.
    pub fn empty() -> Self {
        Self {
            anthropic: None,
            openai: None,
        }
    }

    /// Build both HTTP backends from provider settings.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            anthropic: Some(Arc::new(AnthropicProvider::new(config.anthropic.clone())?)),
            openai: Some(Arc::new(OpenAiProvider::new(config.openai.clone())?)),
        })
    }

    /// Register or replace the backend for `kind`.
    pub fn with_provider(
        mut self,
        kind: ProviderKind,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        match kind {
            ProviderKind::Anthropic => self.anthropic = Some(provider),
            ProviderKind::OpenAi => self.openai = Some(provider),
        }
        self
    }

    /// Backend registered for `kind`.
    pub fn provider_for(&self, kind: ProviderKind) -> Option<&Arc<dyn CompletionProvider>> {
        match kind {
            ProviderKind::Anthropic => self.anthropic.as_ref(),
            ProviderKind::OpenAi => self.openai.as_ref(),
        }
    }
}

#[async_trait]
impl CompletionProvider for ProviderRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn complete(
        &self,
        prompt: &str,
        input: &str,
        role: &RoleBinding,
    ) -> Result<String, ProviderError> {
        let kind = role.model.provider;
        let provider = self.provider_for(kind).ok_or_else(|| {
            ProviderError::fatal(format!("no {} provider registered", kind.as_str()))
        })?;
        trace!(role = %role.role, provider = provider.name(), "routing completion");
        provider.complete(prompt, input, role).await
    }
}
