//! Completion provider port - the single capability the optimizer needs from an LLM.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::ProviderError;
use crate::domain::models::RoleBinding;

/// Trait for text completion backends.
///
/// `prompt` is the instruction (a candidate prompt or a rendered meta prompt)
/// and `input` is the data it applies to; `input` is empty for meta prompts.
/// How the two are shaped into a request is up to the implementation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Generate text for the given prompt and input.
    async fn complete(
        &self,
        prompt: &str,
        input: &str,
        role: &RoleBinding,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T: CompletionProvider + ?Sized> CompletionProvider for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn complete(
        &self,
        prompt: &str,
        input: &str,
        role: &RoleBinding,
    ) -> Result<String, ProviderError> {
        (**self).complete(prompt, input, role).await
    }
}
