//! Adapters for external systems: completion providers, dataset files and
//! golden prompt storage.

pub mod dataset;
pub mod providers;
pub mod storage;

pub use dataset::{load_inputs, load_test_cases, DatasetError};
pub use providers::{AnthropicProvider, OpenAiProvider, ProviderRouter, ScriptedProvider};
pub use storage::{GoldenPromptStore, PromptMetadata, SavedArtifacts, StoreError};
