//! Prompt candidates and their provenance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a prompt candidate came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    /// Supplied by the user or drafted from the use case.
    Initial,
    /// Patched to handle a single failing case.
    QuickFix,
    /// Restructured from cross-iteration feedback.
    Evolved,
}

impl CandidateOrigin {
    /// Stable snake_case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::QuickFix => "quick_fix",
            Self::Evolved => "evolved",
        }
    }
}

impl fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable prompt under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCandidate {
    /// Prompt text sent to the answer generator
    pub text: String,
    /// Iteration on which this candidate is first evaluated
    pub iteration: u32,
    /// Operation that produced the text
    pub origin: CandidateOrigin,
}

impl PromptCandidate {
    /// First candidate of a run.
    pub fn initial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            iteration: 1,
            origin: CandidateOrigin::Initial,
        }
    }

    /// Create the candidate that supersedes `self` on the next iteration.
    pub fn successor(&self, text: impl Into<String>, origin: CandidateOrigin) -> Self {
        Self {
            text: text.into(),
            iteration: self.iteration + 1,
            origin,
        }
    }
}
