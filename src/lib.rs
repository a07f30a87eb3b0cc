//! Golden Prompt - iterative prompt optimizer
//!
//! Searches for a "golden prompt" that makes a language model reproduce the
//! expected outputs of a labeled dataset. Each iteration evaluates a candidate
//! prompt concurrently against every test case, scores the run, and either
//! patches the prompt for one failure, evolves it from feedback gathered
//! across recent iterations, or validates it with repeated passes before
//! accepting it.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): evaluator, scorer, mutator, feedback
//!   synthesizer, validator and the optimization engine
//! - **Adapters** (`adapters`): completion providers, dataset files and
//!   golden prompt storage
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use golden_prompt::{ConfigLoader, InitialPrompt, OptimizationEngine, PromptTemplates};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let cases = golden_prompt::adapters::load_test_cases("data/golden_data.yaml".as_ref())?;
//!     let provider = std::sync::Arc::new(
//!         golden_prompt::adapters::ProviderRouter::from_config(&config.providers)?,
//!     );
//!     let templates = PromptTemplates::default();
//!     let engine = OptimizationEngine::from_config(&config, provider, templates)?;
//!     let result = engine
//!         .run(InitialPrompt::Generate { use_case: "Classify sentiment".into() }, &cases)
//!         .await?;
//!     println!("{}", result.final_prompt.text);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ConfigError, OptimizerError, OptimizerResult, ProviderError};
pub use domain::models::{
    Config, EvaluationRun, OptimizationResult, PromptCandidate, QualityMetrics, Role,
    TerminationReason, TestCase,
};
pub use domain::ports::{CompletionProvider, Sleeper};
pub use infrastructure::config::ConfigLoader;
pub use services::{
    ConcurrentEvaluator, InitialPrompt, OptimizationEngine, PromptTemplates, QualityScorer,
};
