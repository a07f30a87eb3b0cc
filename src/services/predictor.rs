//! Applies a golden prompt to unlabeled inputs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{OptimizerError, OptimizerResult};
use crate::domain::models::{PerformanceConfig, RoleBinding};
use crate::domain::ports::{CompletionProvider, Sleeper, TokioSleeper};
use crate::services::rate_limiter::RollingWindowLimiter;
use crate::services::retry::RetryPolicy;

/// Answer recorded when every attempt for an input failed.
pub const ERROR_ANSWER: &str = "ERROR";

const NO_REASONING: &str = "No specific reasoning provided";

const RESPONSE_FORMAT: &str = "Please provide:
1. Your answer/classification
2. A brief explanation of your reasoning

Format your response as:
Answer: [your answer]
Reasoning: [your explanation]";

/// One prediction for an unlabeled input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Input as given, trimmed
    pub input: String,
    /// Parsed answer, or `ERROR`
    pub answer: String,
    /// Parsed reasoning, or the error message
    pub reasoning: String,
}

impl Prediction {
    /// True when every attempt for the input failed.
    pub fn is_error(&self) -> bool {
        self.answer == ERROR_ANSWER
    }
}

/// Runs the answer generator over inputs, asking for an answer and its reasoning.
pub struct Predictor {
    provider: Arc<dyn CompletionProvider>,
    role: RoleBinding,
    retry: RetryPolicy,
    limiter: RollingWindowLimiter,
    sleeper: Arc<dyn Sleeper>,
}

impl Predictor {
    /// Create a predictor with the retry and rate limits of `performance`.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        role: RoleBinding,
        performance: &PerformanceConfig,
    ) -> Self {
        Self {
            provider,
            role,
            retry: RetryPolicy::from_config(performance),
            limiter: RollingWindowLimiter::per_minute(performance.api_rate_limit),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the timer used for retry backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Predict every input in order.
    ///
    /// A per-input failure yields answer `ERROR` with the error as reasoning;
    /// a fatal provider error stops the whole run.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub async fn predict(
        &self,
        prompt: &str,
        inputs: &[String],
    ) -> OptimizerResult<Vec<Prediction>> {
        let system = format!("{}\n\n{RESPONSE_FORMAT}", prompt.trim());
        let mut predictions = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let input = input.trim();
            let user = format!("Input: {input}");
            let outcome = self
                .retry
                .execute(self.sleeper.as_ref(), |_| {
                    let system = system.as_str();
                    let user = user.as_str();
                    async move {
                        self.limiter.acquire().await;
                        self.provider.complete(system, user, &self.role).await
                    }
                })
                .await;

            let prediction = match outcome.result {
                Ok(response) => {
                    let (answer, reasoning) = parse_response(&response);
                    debug!(index, answer = %answer, "prediction");
                    Prediction {
                        input: input.to_string(),
                        answer,
                        reasoning,
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(index, attempts = outcome.attempts, error = %err, "prediction failed");
                    Prediction {
                        input: input.to_string(),
                        answer: ERROR_ANSWER.to_string(),
                        reasoning: err.message().to_string(),
                    }
                }
                Err(err) => {
                    return Err(OptimizerError::from_provider(
                        "prediction",
                        &err,
                        outcome.attempts,
                    ));
                }
            };
            predictions.push(prediction);
        }

        let failed = predictions.iter().filter(|p| p.is_error()).count();
        info!(total = predictions.len(), failed, "predictions complete");
        Ok(predictions)
    }
}

/// Split a response into answer and reasoning.
///
/// Looks for `Answer:` and `Reasoning:` lines (case-insensitive); reasoning
/// runs to the end of the response. Without an answer line the first line
/// is the answer and the rest the reasoning.
pub fn parse_response(response: &str) -> (String, String) {
    let trimmed = response.trim();
    let lines: Vec<&str> = trimmed.lines().collect();
    let mut answer = String::new();
    let mut reasoning = String::new();

    for (i, line) in lines.iter().enumerate() {
        let lower = line.trim_start().to_lowercase();
        if lower.starts_with("answer:") {
            answer = after_colon(line).to_string();
        } else if lower.starts_with("reasoning:") {
            let rest = lines[i..].join("\n");
            reasoning = after_colon(&rest).to_string();
            break;
        }
    }

    if answer.is_empty() && !trimmed.is_empty() {
        let mut parts = trimmed.splitn(2, '\n');
        answer = parts.next().unwrap_or_default().trim().to_string();
        reasoning = parts
            .next()
            .map(str::trim)
            .filter(|rest| !rest.is_empty())
            .unwrap_or(NO_REASONING)
            .to_string();
    }

    (answer, reasoning)
}

fn after_colon(text: &str) -> &str {
    text.split_once(':').map_or("", |(_, rest)| rest.trim())
}
