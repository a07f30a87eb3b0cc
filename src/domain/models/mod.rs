//! Domain models for the optimizer.

pub mod candidate;
pub mod config;
pub mod evaluation;
pub mod feedback;
pub mod result;
pub mod role;
pub mod test_case;
pub mod validation;

pub use candidate::{CandidateOrigin, PromptCandidate};
pub use config::{
    AnthropicSettings, ConfidenceValidationConfig, Config, DataConfig, LoggingConfig, MatchMethod,
    MatchingConfig, OpenAiSettings, OptimizationConfig, PerformanceConfig, ProjectConfig,
    ProvidersConfig, ScoringConfig, ScoringWeights,
};
pub use evaluation::{CaseResult, EvaluationRun, FailingCase, QualityMetrics, RunKind};
pub use feedback::{FailureCause, FailureCluster, FeedbackSummary};
pub use result::{Decision, IterationDecision, OptimizationResult, TerminationReason};
pub use role::{ModelConfig, ModelsConfig, ProviderKind, Role, RoleBinding};
pub use test_case::TestCase;
pub use validation::{ConfidenceValidationState, ValidationStatus};
