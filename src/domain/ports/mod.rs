//! Port trait definitions (Hexagonal Architecture)
//!
//! - CompletionProvider: text generation backends
//! - Sleeper: timer used by retry backoff

pub mod completion_provider;
pub mod sleeper;

pub use completion_provider::CompletionProvider;
pub use sleeper::{Sleeper, TokioSleeper};
