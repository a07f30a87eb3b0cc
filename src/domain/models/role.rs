//! Provider roles and per-role model selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The job a provider call performs in the optimization loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Drafts the first prompt from the use case and a sample.
    InitialPromptGenerator,
    /// Runs a candidate prompt against a test input.
    AnswerGenerator,
    /// Patches a prompt for one failing case.
    PromptOptimizer,
    /// Analyzes failures across several iterations.
    FeedbackCollector,
    /// Restructures a prompt from synthesized feedback.
    PromptEvolver,
}

impl Role {
    /// Every role, in loop order.
    pub const ALL: [Self; 5] = [
        Self::InitialPromptGenerator,
        Self::AnswerGenerator,
        Self::PromptOptimizer,
        Self::FeedbackCollector,
        Self::PromptEvolver,
    ];

    /// Name used in configuration and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InitialPromptGenerator => "initial_prompt_generator",
            Self::AnswerGenerator => "answer_generator",
            Self::PromptOptimizer => "prompt_optimizer",
            Self::FeedbackCollector => "feedback_collector",
            Self::PromptEvolver => "prompt_evolver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of supported completion providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API
    #[default]
    #[serde(alias = "claude")]
    Anthropic,
    /// OpenAI Chat Completions API
    #[serde(rename = "openai", alias = "gpt")]
    OpenAi,
}

impl ProviderKind {
    /// Canonical provider tag.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Parse a provider tag, accepting the legacy `claude`/`gpt` names.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "gpt" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// Provider and model for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// Backend serving the role
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model identifier
    pub model: String,

    /// Sampling temperature; provider default when unset
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Response length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

const fn default_max_tokens() -> u32 {
    4000
}

impl ModelConfig {
    /// Anthropic model with default limits.
    pub fn anthropic(model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: model.into(),
            temperature: None,
            max_tokens: default_max_tokens(),
        }
    }

    /// OpenAI model with default limits.
    pub fn openai(model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: model.into(),
            temperature: None,
            max_tokens: default_max_tokens(),
        }
    }
}

const STRONG_MODEL: &str = "claude-sonnet-4-5-20250929";
const FAST_MODEL: &str = "claude-3-5-sonnet-20241022";

fn strong_model() -> ModelConfig {
    ModelConfig::anthropic(STRONG_MODEL)
}

fn fast_model() -> ModelConfig {
    ModelConfig::anthropic(FAST_MODEL)
}

/// Model selection for every role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelsConfig {
    /// Drafts the first prompt
    #[serde(default = "strong_model")]
    pub initial_prompt_generator: ModelConfig,
    /// Answers test inputs
    #[serde(default = "fast_model")]
    pub answer_generator: ModelConfig,
    /// Repairs prompts for single failures
    #[serde(default = "strong_model")]
    pub prompt_optimizer: ModelConfig,
    /// Analyzes failures across iterations
    #[serde(default = "fast_model")]
    pub feedback_collector: ModelConfig,
    /// Restructures prompts from feedback
    #[serde(default = "strong_model")]
    pub prompt_evolver: ModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            initial_prompt_generator: strong_model(),
            answer_generator: fast_model(),
            prompt_optimizer: strong_model(),
            feedback_collector: fast_model(),
            prompt_evolver: strong_model(),
        }
    }
}

impl ModelsConfig {
    /// Model configured for `role`.
    pub const fn get(&self, role: Role) -> &ModelConfig {
        match role {
            Role::InitialPromptGenerator => &self.initial_prompt_generator,
            Role::AnswerGenerator => &self.answer_generator,
            Role::PromptOptimizer => &self.prompt_optimizer,
            Role::FeedbackCollector => &self.feedback_collector,
            Role::PromptEvolver => &self.prompt_evolver,
        }
    }

    /// Bind a role to its configured model.
    pub fn binding(&self, role: Role) -> RoleBinding {
        RoleBinding {
            role,
            model: self.get(role).clone(),
        }
    }
}

/// A role together with the model that serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleBinding {
    /// The job being done
    pub role: Role,
    /// Model doing it
    pub model: ModelConfig,
}

impl RoleBinding {
    /// Bind `role` to `model`.
    pub fn new(role: Role, model: ModelConfig) -> Self {
        Self { role, model }
    }
}
