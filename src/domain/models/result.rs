//! Optimization outcome and decision log.

use serde::{Deserialize, Serialize};

use super::candidate::PromptCandidate;
use super::evaluation::{EvaluationRun, QualityMetrics};

/// Why the optimization loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TerminationReason {
    /// A candidate met the target (and passed validation when enabled).
    TargetReached,
    /// The iteration budget ran out; the best run was selected.
    IterationBudgetExhausted {
        /// Whether the selected run reached `min_quality_threshold`
        quality_threshold_met: bool,
    },
}

impl TerminationReason {
    /// True when the target was reached.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::TargetReached)
    }
}

/// What the engine decided after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Patch the prompt for one failing case
    QuickFix,
    /// Evolve the prompt from windowed feedback
    FeedbackCycle,
    /// Target met; start confidence validation
    Validate,
    /// A validation pass missed the target
    ValidationFailed,
    /// Target met and validated
    Accept,
    /// No iterations left
    BudgetExhausted,
}

/// Decision log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationDecision {
    /// Iteration the decision was made on
    pub iteration: u32,
    /// What was decided
    pub decision: Decision,
}

/// The terminal artifact of an optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// The golden prompt
    pub final_prompt: PromptCandidate,
    /// Metrics of the run that selected the final prompt
    pub final_metrics: QualityMetrics,
    /// Every evaluation run in order, validation runs included
    pub run_history: Vec<EvaluationRun>,
    /// Why the loop stopped
    pub termination_reason: TerminationReason,
    /// Iteration at which the loop stopped
    pub iterations: u32,
    /// Number of validation runs in the history
    pub validation_runs: usize,
    /// Every decision in order
    pub decisions: Vec<IterationDecision>,
}

impl OptimizationResult {
    /// Optimization runs only, one per iteration.
    pub fn iteration_runs(&self) -> impl Iterator<Item = &EvaluationRun> {
        self.run_history.iter().filter(|run| !run.is_validation())
    }

    /// First decision made on `iteration`.
    pub fn decision_at(&self, iteration: u32) -> Option<Decision> {
        self.decisions
            .iter()
            .find(|d| d.iteration == iteration)
            .map(|d| d.decision)
    }
}
