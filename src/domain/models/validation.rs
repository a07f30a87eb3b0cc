//! Confidence validation state.

use serde::{Deserialize, Serialize};

use super::evaluation::EvaluationRun;

/// Status of an in-flight confidence validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// More passes needed
    InProgress,
    /// Every required pass met the target
    Passed,
    /// A pass missed the target
    Failed,
}

/// Repeated consecutive re-evaluation of a candidate that reached the target.
///
/// Created when a run first meets the target and dropped as soon as it
/// resolves to `Passed` or `Failed`.
#[derive(Debug, Clone)]
pub struct ConfidenceValidationState {
    required_passes: u32,
    passes_so_far: Vec<EvaluationRun>,
    status: ValidationStatus,
}

impl ConfidenceValidationState {
    /// Start validation needing `required_passes` consecutive passes.
    pub fn begin(required_passes: u32) -> Self {
        Self {
            required_passes,
            passes_so_far: Vec::new(),
            status: if required_passes == 0 {
                ValidationStatus::Passed
            } else {
                ValidationStatus::InProgress
            },
        }
    }

    /// Record a validation run and return the resulting status.
    ///
    /// Runs recorded after resolution are ignored.
    pub fn record(&mut self, run: &EvaluationRun, target_success_rate: f64) -> ValidationStatus {
        if self.status != ValidationStatus::InProgress {
            return self.status;
        }

        if run.metrics.meets(target_success_rate) {
            self.passes_so_far.push(run.clone());
            if self.passes_so_far.len() as u32 >= self.required_passes {
                self.status = ValidationStatus::Passed;
            }
        } else {
            self.status = ValidationStatus::Failed;
        }

        self.status
    }

    /// Current status.
    pub const fn status(&self) -> ValidationStatus {
        self.status
    }

    /// Consecutive passes needed.
    pub const fn required_passes(&self) -> u32 {
        self.required_passes
    }

    /// Passing runs recorded so far.
    pub fn passes_so_far(&self) -> &[EvaluationRun] {
        &self.passes_so_far
    }

    /// Passing runs still needed before the candidate is accepted.
    pub fn remaining(&self) -> u32 {
        self.required_passes
            .saturating_sub(self.passes_so_far.len() as u32)
    }
}
