//! Optimization services: evaluation, scoring, mutation, feedback,
//! validation and the engine that drives them.

pub mod engine;
pub mod evaluator;
pub mod feedback;
pub mod mutator;
pub mod predictor;
pub mod prompts;
pub mod rate_limiter;
pub mod retry;
pub mod scorer;
pub mod validator;

pub use engine::{decide, next_step, select_best, InitialPrompt, OptimizationEngine, RunObserver};
pub use evaluator::ConcurrentEvaluator;
pub use feedback::FeedbackSynthesizer;
pub use mutator::{extract_prompt, PromptMutator};
pub use predictor::{parse_response, Prediction, Predictor};
pub use prompts::{render, PromptTemplates};
pub use rate_limiter::RollingWindowLimiter;
pub use retry::{RetryOutcome, RetryPolicy};
pub use scorer::{QualityScorer, ScoreReport};
pub use validator::{ConfidenceValidator, ValidationOutcome};
