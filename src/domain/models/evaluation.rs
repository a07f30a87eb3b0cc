//! Evaluation runs and their per-case results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::PromptCandidate;
use super::config::MatchMethod;

/// Outcome of running a candidate prompt against one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Position of the case in the dataset
    pub case_index: usize,
    /// Provider output; empty when every attempt failed
    pub generated_output: String,
    /// Whether the output matched the expected output
    pub matched: bool,
    /// Comparison used for `matched`
    pub match_method: MatchMethod,
    /// Wall time from first attempt to final outcome, rate-limit waits included
    pub latency_ms: u64,
    /// Provider calls made for this case
    pub attempts: u32,
    /// Last provider error if every attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    /// True when the case never got an answer.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Why an evaluation pass was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RunKind {
    /// Regular evaluation of a new candidate.
    Optimization,
    /// Re-evaluation of a passing candidate; `pass` counts from 1.
    Validation {
        /// Pass number within the validation
        pass: u32,
    },
}

impl RunKind {
    /// True for validation passes.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Aggregate scores of one evaluation pass, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Matched cases as a percentage
    pub success_rate: f64,
    /// Agreement of outputs that should agree
    pub consistency_score: f64,
    /// Success rate over edge cases
    pub robustness_score: f64,
    /// Weighted mean of the three scores
    pub overall_quality: f64,
    /// Cases that matched
    pub matched_cases: usize,
    /// Cases evaluated
    pub total_cases: usize,
}

impl QualityMetrics {
    /// True when the success rate reaches `target_success_rate`.
    pub fn meets(&self, target_success_rate: f64) -> bool {
        self.success_rate >= target_success_rate
    }
}

/// A case the candidate got wrong, with everything needed to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingCase {
    /// Position of the case in the dataset
    pub case_index: usize,
    /// Case input
    pub input: String,
    /// Expected output
    pub expected: String,
    /// What the provider returned
    pub actual: String,
    /// Reason attached to the case, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Provider error when no answer was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One completed evaluation pass. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Unique run id
    pub run_id: Uuid,
    /// Candidate that was evaluated
    pub candidate: PromptCandidate,
    /// Regular evaluation or validation pass
    pub kind: RunKind,
    /// Iteration in which the run happened
    pub iteration: u32,
    /// Ordered by case index
    pub per_case_results: Vec<CaseResult>,
    /// Scores of this run
    pub metrics: QualityMetrics,
    /// Ordered by case index
    pub failing_cases: Vec<FailingCase>,
    /// Completion time
    pub timestamp: DateTime<Utc>,
}

impl EvaluationRun {
    /// True for validation passes.
    pub fn is_validation(&self) -> bool {
        self.kind.is_validation()
    }

    /// The case chosen to drive a quick fix: the first failure in case order.
    pub fn representative_failure(&self) -> Option<&FailingCase> {
        self.failing_cases.first()
    }
}
