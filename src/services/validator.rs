//! Confidence validation of candidates that reached the target.

use tracing::{debug, info, instrument, warn};

use crate::domain::errors::OptimizerResult;
use crate::domain::models::{
    ConfidenceValidationConfig, ConfidenceValidationState, EvaluationRun, PromptCandidate, RunKind,
    TestCase, ValidationStatus,
};
use crate::services::evaluator::ConcurrentEvaluator;

/// Result of validating one candidate.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// `Passed` or `Failed`
    pub status: ValidationStatus,
    /// Validation runs in order; the last one failed when `status` is `Failed`
    pub runs: Vec<EvaluationRun>,
}

impl ValidationOutcome {
    /// True when every pass met the target.
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    /// The run that broke the streak.
    pub fn failing_run(&self) -> Option<&EvaluationRun> {
        if self.status == ValidationStatus::Failed {
            self.runs.last()
        } else {
            None
        }
    }
}

/// Re-evaluates a passing candidate until it has passed the required number
/// of consecutive times or fails once.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceValidator {
    enabled: bool,
    required_passes: u32,
    target_success_rate: f64,
}

impl ConfidenceValidator {
    /// Validator needing `required_passes` consecutive passes at `target_success_rate`.
    pub const fn new(enabled: bool, required_passes: u32, target_success_rate: f64) -> Self {
        Self {
            enabled,
            required_passes,
            target_success_rate,
        }
    }

    /// Validator configured from `confidence_validation`.
    pub const fn from_config(
        config: &ConfidenceValidationConfig,
        target_success_rate: f64,
    ) -> Self {
        Self::new(
            config.enabled,
            config.required_consecutive_passes,
            target_success_rate,
        )
    }

    /// Whether passing candidates are validated at all.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validation runs needed for acceptance; zero when disabled.
    pub const fn required_passes(&self) -> u32 {
        if self.enabled {
            self.required_passes
        } else {
            0
        }
    }

    /// Run validation passes for `candidate`.
    ///
    /// `prior` holds earlier runs of the same candidate and feeds the
    /// consistency score of each pass together with the passes so far.
    #[instrument(
        skip_all,
        fields(iteration = candidate.iteration, required = self.required_passes())
    )]
    pub async fn validate(
        &self,
        evaluator: &ConcurrentEvaluator,
        candidate: &PromptCandidate,
        cases: &[TestCase],
        prior: &[&EvaluationRun],
    ) -> OptimizerResult<ValidationOutcome> {
        let mut state = ConfidenceValidationState::begin(self.required_passes());
        let mut runs: Vec<EvaluationRun> = Vec::new();
        let mut pass = 0;

        while state.status() == ValidationStatus::InProgress {
            pass += 1;
            let repeats: Vec<&EvaluationRun> = prior.iter().copied().chain(runs.iter()).collect();
            let run = evaluator
                .evaluate(candidate, cases, RunKind::Validation { pass }, &repeats)
                .await?;

            let status = state.record(&run, self.target_success_rate);
            debug!(
                pass,
                success_rate = run.metrics.success_rate,
                remaining = state.remaining(),
                "validation pass evaluated"
            );
            runs.push(run);

            if status == ValidationStatus::Failed {
                warn!(pass, "candidate failed confidence validation");
            }
        }

        if state.status() == ValidationStatus::Passed {
            info!(
                passes = runs.len(),
                "candidate passed confidence validation"
            );
        }

        Ok(ValidationOutcome {
            status: state.status(),
            runs,
        })
    }
}
