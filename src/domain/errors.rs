//! Domain errors for the golden prompt optimizer.

use thiserror::Error;

/// Failure reported by a completion provider.
///
/// Providers classify every failure as either transient (worth retrying) or
/// fatal (the provider cannot serve any request until reconfigured).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Worth retrying after a backoff.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Retrying cannot help; the run must stop.
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Returns true if this error should be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The underlying message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(message) | Self::Fatal(message) => message,
        }
    }
}

/// Invalid or missing configuration option.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `optimization.max_iterations` is zero.
    #[error("Invalid optimization.max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    /// `optimization.target_success_rate` is outside `[0, 100]`.
    #[error("Invalid optimization.target_success_rate: {0}. Must be between 0 and 100")]
    InvalidTargetSuccessRate(f64),

    /// `optimization.feedback_frequency` is zero.
    #[error("Invalid optimization.feedback_frequency: {0}. Must be at least 1")]
    InvalidFeedbackFrequency(u32),

    /// `optimization.min_quality_threshold` is outside `[0, 100]`.
    #[error("Invalid optimization.min_quality_threshold: {0}. Must be between 0 and 100")]
    InvalidQualityThreshold(f64),

    /// Validation is enabled with zero required passes.
    #[error("Invalid confidence_validation.required_consecutive_passes: {0}. Must be at least 1")]
    InvalidRequiredPasses(u32),

    /// `performance.max_workers` is zero.
    #[error("Invalid performance.max_workers: {0}. Must be at least 1")]
    InvalidMaxWorkers(usize),

    /// `performance.batch_size` is zero.
    #[error("Invalid performance.batch_size: {0}. Must be at least 1")]
    InvalidBatchSize(usize),

    /// `performance.api_rate_limit` is zero.
    #[error("Invalid performance.api_rate_limit: {0}. Must be at least 1 request per minute")]
    InvalidRateLimit(u32),

    /// `performance.retry_delay` is negative or not finite.
    #[error("Invalid performance.retry_delay: {0}. Must be a finite, non-negative number of seconds")]
    InvalidRetryDelay(f64),

    /// `matching.fuzzy_threshold` is outside `[0, 1]`.
    #[error("Invalid matching.fuzzy_threshold: {0}. Must be between 0 and 1")]
    InvalidFuzzyThreshold(f64),

    /// Scoring weights are negative or sum to zero.
    #[error("Invalid scoring.weights: {0}")]
    InvalidWeights(String),

    /// Unknown `logging.level`.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// A role has an empty model name.
    #[error("Model name for role '{0}' cannot be empty")]
    EmptyModelName(String),

    /// The prompts file could not be read or parsed.
    #[error("Invalid prompts file {path}: {reason}")]
    InvalidPromptsFile {
        /// Path as configured
        path: String,
        /// Read or parse failure
        reason: String,
    },

    /// Any other invalid value.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors that stop an optimization run.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration was rejected before the run started.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// No test cases to evaluate.
    #[error("Dataset is empty: at least one test case is required")]
    DatasetEmpty,

    /// A provider call failed fatally.
    #[error("Provider failed fatally during {stage}: {message}")]
    ProviderFatal {
        /// Component whose call failed
        stage: String,
        /// Provider error message
        message: String,
    },

    /// A required provider call ran out of retries.
    #[error("Provider still failing after {attempts} attempts during {stage}: {message}")]
    ProviderExhausted {
        /// Component whose call failed
        stage: String,
        /// Calls made, first attempt included
        attempts: u32,
        /// Last provider error
        message: String,
    },
}

impl OptimizerError {
    /// Wrap a provider failure with the stage in which it happened.
    pub fn from_provider(stage: impl Into<String>, err: &ProviderError, attempts: u32) -> Self {
        match err {
            ProviderError::Fatal(message) => Self::ProviderFatal {
                stage: stage.into(),
                message: message.clone(),
            },
            ProviderError::Transient(message) => Self::ProviderExhausted {
                stage: stage.into(),
                attempts,
                message: message.clone(),
            },
        }
    }
}

/// Result type for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;
