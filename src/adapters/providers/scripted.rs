//! Scripted provider for testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::errors::ProviderError;
use crate::domain::models::{Role, RoleBinding};
use crate::domain::ports::CompletionProvider;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    /// Instruction text
    pub prompt: String,
    /// Data text; empty for meta prompts
    pub input: String,
    /// Role of the call
    pub role: Role,
    /// Model the role is bound to
    pub model: String,
}

type Responder = dyn Fn(&ProviderCall) -> Result<String, ProviderError> + Send + Sync;
type Latency = dyn Fn(&ProviderCall) -> Duration + Send + Sync;

/// Provider whose answers come from a closure; every call is recorded.
#[derive(Clone)]
pub struct ScriptedProvider {
    responder: Arc<Responder>,
    latency: Option<Arc<Latency>>,
    calls: Arc<Mutex<Vec<ProviderCall>>>,
}

impl ScriptedProvider {
    /// Answer every call with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ProviderCall) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            latency: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `text`.
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Delay each answer by the duration returned for the call.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&ProviderCall) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Arc::new(latency));
        self
    }

    /// Shared handle to the call log.
    pub fn call_log(&self) -> Arc<Mutex<Vec<ProviderCall>>> {
        self.calls.clone()
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Calls made for `role`, in order.
    pub fn calls_for(&self, role: Role) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.role == role)
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        input: &str,
        role: &RoleBinding,
    ) -> Result<String, ProviderError> {
        let call = ProviderCall {
            prompt: prompt.to_string(),
            input: input.to_string(),
            role: role.role,
            model: role.model.model.clone(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.clone());
        }

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(&call)).await;
        }

        (self.responder)(&call)
    }
}
