//! Configuration model.
//!
//! Every section has defaults so a partial YAML file is always valid input.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::errors::ConfigError;
use crate::domain::models::role::{ModelsConfig, Role};

/// Main configuration structure for the optimizer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Iteration budget and stopping targets
    #[serde(default)]
    pub optimization: OptimizationConfig,

    /// Repeated re-evaluation before accepting a candidate
    #[serde(default)]
    pub confidence_validation: ConfidenceValidationConfig,

    /// Worker pool, rate limit and retry settings for evaluation
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Output matching rules
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Composite quality weights and edge-case selection
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Provider and model per role
    #[serde(default)]
    pub models: ModelsConfig,

    /// Provider endpoint settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional YAML file overriding the built-in prompt templates
    #[serde(default)]
    pub prompts_file: Option<PathBuf>,

    /// Project description
    #[serde(default)]
    pub project: ProjectConfig,

    /// Default input and output locations
    #[serde(default)]
    pub data: DataConfig,
}

impl Config {
    /// Validate every recognized option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimization.validate()?;
        self.confidence_validation.validate()?;
        self.performance.validate()?;
        self.matching.validate()?;
        self.scoring.validate()?;
        self.logging.validate()?;

        for role in Role::ALL {
            let model = self.models.get(role);
            if model.model.trim().is_empty() {
                return Err(ConfigError::EmptyModelName(role.as_str().to_string()));
            }
        }

        Ok(())
    }
}

/// Iteration budget and stopping targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizationConfig {
    /// Maximum number of optimization iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Success rate (percent) a candidate must reach
    #[serde(default = "default_target_success_rate")]
    pub target_success_rate: f64,

    /// Run a feedback cycle every N iterations
    #[serde(default = "default_feedback_frequency")]
    pub feedback_frequency: u32,

    /// Quality (percent) considered acceptable when the budget runs out
    #[serde(default = "default_min_quality_threshold")]
    pub min_quality_threshold: f64,
}

const fn default_max_iterations() -> u32 {
    15
}

const fn default_target_success_rate() -> f64 {
    100.0
}

const fn default_feedback_frequency() -> u32 {
    3
}

const fn default_min_quality_threshold() -> f64 {
    85.0
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            target_success_rate: default_target_success_rate(),
            feedback_frequency: default_feedback_frequency(),
            min_quality_threshold: default_min_quality_threshold(),
        }
    }
}

impl OptimizationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(self.max_iterations));
        }
        if !is_percentage(self.target_success_rate) {
            return Err(ConfigError::InvalidTargetSuccessRate(
                self.target_success_rate,
            ));
        }
        if self.feedback_frequency == 0 {
            return Err(ConfigError::InvalidFeedbackFrequency(
                self.feedback_frequency,
            ));
        }
        if !is_percentage(self.min_quality_threshold) {
            return Err(ConfigError::InvalidQualityThreshold(
                self.min_quality_threshold,
            ));
        }
        Ok(())
    }
}

/// Confidence validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfidenceValidationConfig {
    /// Whether a passing candidate must be re-validated
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of additional consecutive passing runs required
    #[serde(default = "default_required_passes")]
    pub required_consecutive_passes: u32,
}

const fn default_required_passes() -> u32 {
    3
}

impl Default for ConfidenceValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required_consecutive_passes: default_required_passes(),
        }
    }
}

impl ConfidenceValidationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.required_consecutive_passes == 0 {
            return Err(ConfigError::InvalidRequiredPasses(
                self.required_consecutive_passes,
            ));
        }
        Ok(())
    }
}

/// Evaluation concurrency, rate limiting and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PerformanceConfig {
    /// Run test cases on a worker pool
    #[serde(default = "default_true")]
    pub enable_parallel: bool,

    /// Maximum concurrent provider calls
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Number of test cases dispatched per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum requests started per rolling minute
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,

    /// Retries after the first attempt of a case
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Double the delay on every retry
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

const fn default_max_workers() -> usize {
    4
}

const fn default_batch_size() -> usize {
    10
}

const fn default_api_rate_limit() -> u32 {
    50
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay() -> f64 {
    2.0
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            api_rate_limit: default_api_rate_limit(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            exponential_backoff: true,
        }
    }
}

impl PerformanceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidMaxWorkers(self.max_workers));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.api_rate_limit == 0 {
            return Err(ConfigError::InvalidRateLimit(self.api_rate_limit));
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            return Err(ConfigError::InvalidRetryDelay(self.retry_delay));
        }
        Ok(())
    }
}

/// How generated output is compared with expected output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Normalized string equality
    #[default]
    Exact,
    /// Similarity ratio at or above the fuzzy threshold
    Fuzzy,
    /// Expected output appears inside the generated output
    Contains,
}

impl MatchMethod {
    /// Name used in configuration files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::Contains => "contains",
        }
    }
}

/// Output matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MatchingConfig {
    /// How generated output is compared to the expected output
    #[serde(default)]
    pub method: MatchMethod,

    /// Minimum similarity ratio for fuzzy matching
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Compare without folding case
    #[serde(default)]
    pub case_sensitive: bool,
}

const fn default_fuzzy_threshold() -> f64 {
    0.9
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            method: MatchMethod::default(),
            fuzzy_threshold: default_fuzzy_threshold(),
            case_sensitive: false,
        }
    }
}

impl MatchingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(ConfigError::InvalidFuzzyThreshold(self.fuzzy_threshold));
        }
        Ok(())
    }
}

/// Weights of the composite quality score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringWeights {
    /// Weight of the success rate
    #[serde(default = "default_success_weight")]
    pub success_rate: f64,
    /// Weight of the consistency score
    #[serde(default = "default_secondary_weight")]
    pub consistency: f64,
    /// Weight of the robustness score
    #[serde(default = "default_secondary_weight")]
    pub robustness: f64,
}

const fn default_success_weight() -> f64 {
    0.5
}

const fn default_secondary_weight() -> f64 {
    0.25
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            success_rate: default_success_weight(),
            consistency: default_secondary_weight(),
            robustness: default_secondary_weight(),
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.success_rate + self.consistency + self.robustness
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    /// Weights of the overall quality score
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Inputs with at most this many words count as edge cases
    #[serde(default = "default_edge_case_max_words")]
    pub edge_case_max_words: usize,

    /// Explicit edge-case indices; overrides the word-count heuristic
    #[serde(default)]
    pub edge_case_indices: Vec<usize>,
}

const fn default_edge_case_max_words() -> usize {
    3
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            edge_case_max_words: default_edge_case_max_words(),
            edge_case_indices: vec![],
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        for (name, value) in [
            ("success_rate", w.success_rate),
            ("consistency", w.consistency),
            ("robustness", w.robustness),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeights(format!(
                    "{name} weight must be a non-negative number, got {value}"
                )));
            }
        }
        if w.total() <= 0.0 {
            return Err(ConfigError::InvalidWeights(
                "at least one weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Anthropic endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnthropicSettings {
    /// API key; read from ANTHROPIC_API_KEY when unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL
    #[serde(default = "default_anthropic_url")]
    pub base_url: String,
    /// Value of the `anthropic-version` header
    #[serde(default = "default_anthropic_version")]
    pub api_version: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

const fn default_timeout_secs() -> u64 {
    120
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_url(),
            api_version: default_anthropic_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// OpenAI endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpenAiSettings {
    /// API key; read from OPENAI_API_KEY when unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Provider endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProvidersConfig {
    /// Anthropic Messages API
    #[serde(default)]
    pub anthropic: AnthropicSettings,
    /// OpenAI Chat Completions API
    #[serde(default)]
    pub openai: OpenAiSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log format: {}. Must be one of: json, pretty",
                self.format
            )));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.rotation.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log rotation: {}. Must be one of: daily, hourly, never",
                self.rotation
            )));
        }
        Ok(())
    }
}

/// Project description used to generate the initial prompt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProjectConfig {
    /// Project name shown in saved prompts
    #[serde(default)]
    pub name: Option<String>,
    /// Use case description for drafting the first prompt
    #[serde(default)]
    pub use_case: Option<String>,
}

/// Default file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DataConfig {
    /// Labeled test cases for `optimize`
    #[serde(default = "default_dataset_file")]
    pub dataset_file: PathBuf,
    /// Unlabeled inputs for `predict`
    #[serde(default = "default_actual_data_file")]
    pub actual_data_file: PathBuf,
    /// Where `predict` writes its output
    #[serde(default = "default_predicted_data_file")]
    pub predicted_data_file: PathBuf,
    /// Directory for golden prompt artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_dataset_file() -> PathBuf {
    PathBuf::from("data/golden_data.yaml")
}

fn default_actual_data_file() -> PathBuf {
    PathBuf::from("data/actual_data.yaml")
}

fn default_predicted_data_file() -> PathBuf {
    PathBuf::from("data/predicted_data.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("golden_prompts")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_file: default_dataset_file(),
            actual_data_file: default_actual_data_file(),
            predicted_data_file: default_predicted_data_file(),
            output_dir: default_output_dir(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn is_percentage(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.optimization.max_iterations, 15);
        assert!(
            (config.optimization.target_success_rate - 100.0).abs() < f64::EPSILON
        );
        assert_eq!(config.optimization.feedback_frequency, 3);
        assert!(config.confidence_validation.enabled);
        assert_eq!(config.confidence_validation.required_consecutive_passes, 3);
        assert_eq!(config.matching.method, MatchMethod::Exact);
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
optimization:
  max_iterations: 10
  target_success_rate: 90
confidence_validation:
  enabled: false
performance:
  max_workers: 8
  api_rate_limit: 30
  exponential_backoff: false
matching:
  method: fuzzy
  fuzzy_threshold: 0.8
models:
  answer_generator:
    provider: gpt
    model: gpt-4o
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.optimization.max_iterations, 10);
        assert_eq!(config.optimization.feedback_frequency, 3);
        assert!(!config.confidence_validation.enabled);
        assert_eq!(config.performance.max_workers, 8);
        assert_eq!(config.performance.batch_size, 10);
        assert!(!config.performance.exponential_backoff);
        assert_eq!(config.matching.method, MatchMethod::Fuzzy);
        assert_eq!(config.models.answer_generator.model, "gpt-4o");
        config.validate().expect("parsed config should be valid");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.optimization.max_iterations = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxIterations(0)));

        let mut config = Config::default();
        config.optimization.target_success_rate = 120.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTargetSuccessRate(_))
        ));

        let mut config = Config::default();
        config.performance.api_rate_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRateLimit(0)));

        let mut config = Config::default();
        config.matching.fuzzy_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFuzzyThreshold(_))
        ));

        let mut config = Config::default();
        config.scoring.weights = ScoringWeights {
            success_rate: 0.0,
            consistency: 0.0,
            robustness: 0.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeights(_))
        ));

        let mut config = Config::default();
        config.models.prompt_evolver.model = "  ".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyModelName("prompt_evolver".to_string()))
        );
    }
}
