//! Completion provider adapters.

pub mod anthropic;
pub mod error;
pub mod openai;
pub mod router;
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use error::HttpApiError;
pub use openai::OpenAiProvider;
pub use router::ProviderRouter;
pub use scripted::{ProviderCall, ScriptedProvider};
