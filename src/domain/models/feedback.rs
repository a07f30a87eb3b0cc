//! Failure classification and synthesized feedback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

use super::evaluation::FailingCase;

/// Coarse classification of why a case failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Every provider attempt failed
    ProviderError,
    EmptyOutput,
    /// Right answer, wrong punctuation, casing or spacing
    FormatMismatch,
    /// Expected answer buried in extra text
    ExtraContent,
    /// Output is a fragment of the expected answer
    IncompleteAnswer,
    /// Wrong answer on a short, underspecified input
    BoundaryAmbiguity,
    /// Anything else
    WrongAnswer,
}

impl FailureCause {
    /// Stable snake_case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderError => "provider_error",
            Self::EmptyOutput => "empty_output",
            Self::FormatMismatch => "format_mismatch",
            Self::ExtraContent => "extra_content",
            Self::IncompleteAnswer => "incomplete_answer",
            Self::BoundaryAmbiguity => "boundary_ambiguity",
            Self::WrongAnswer => "wrong_answer",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures sharing a cause across the feedback window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCluster {
    /// Shared cause
    pub cause: FailureCause,
    /// Failures counted over every run in the window
    pub occurrences: usize,
    /// Distinct case indices, ascending
    pub case_indices: Vec<usize>,
    /// Most recent failure with this cause
    pub example: FailingCase,
}

/// Cross-iteration analysis fed to the prompt evolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    /// Iterations covered, ascending
    pub iterations: Vec<u32>,
    /// Mean success rate over the window
    pub mean_success_rate: f64,
    /// Success rate of the newest run
    pub latest_success_rate: f64,
    /// Largest cluster first
    pub clusters: Vec<FailureCluster>,
    /// Cases that failed in every run of the window
    pub persistent_failures: Vec<usize>,
    /// Provider-written analysis; empty when the analysis call gave up
    pub analysis: String,
}

impl FeedbackSummary {
    /// Cause of the largest cluster.
    pub fn dominant_cause(&self) -> Option<FailureCause> {
        self.clusters.first().map(|cluster| cluster.cause)
    }

    /// Plain-text rendering used as the evolver's `{feedback}`.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let span = match (self.iterations.first(), self.iterations.last()) {
            (Some(first), Some(last)) if first != last => format!("iterations {first}-{last}"),
            (Some(only), _) => format!("iteration {only}"),
            _ => "no iterations".to_string(),
        };
        let _ = writeln!(
            out,
            "Performance over {span}: mean success {:.1}%, latest {:.1}%",
            self.mean_success_rate, self.latest_success_rate
        );

        if self.clusters.is_empty() {
            out.push_str("No failures recorded.\n");
        } else {
            out.push_str("Failure patterns:\n");
            for cluster in &self.clusters {
                let _ = writeln!(
                    out,
                    "- {}: {} occurrence(s) across cases {:?}; e.g. input {:?} expected {:?} got {:?}",
                    cluster.cause,
                    cluster.occurrences,
                    cluster.case_indices,
                    cluster.example.input,
                    cluster.example.expected,
                    cluster.example.actual,
                );
            }
        }

        if !self.persistent_failures.is_empty() {
            let _ = writeln!(
                out,
                "Cases failing in every run: {:?}",
                self.persistent_failures
            );
        }

        if !self.analysis.trim().is_empty() {
            out.push_str("\nAnalysis:\n");
            out.push_str(self.analysis.trim());
            out.push('\n');
        }

        out
    }
}
