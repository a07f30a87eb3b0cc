//! Labeled test cases.

use serde::{Deserialize, Serialize};

/// A labeled example: an input and the output the golden prompt must reproduce.
///
/// Identity is the position of the case in its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Text given to the answer generator
    #[serde(alias = "input_data")]
    pub input: String,

    /// Output the prompt must reproduce
    pub expected_output: String,

    /// Why the expected output is correct, if the dataset says
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TestCase {
    /// Case without a reason.
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            reason: None,
        }
    }

    /// Attach the reason for the expected output.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Number of whitespace-separated words in the input.
    pub fn input_word_count(&self) -> usize {
        self.input.split_whitespace().count()
    }

    /// A case is usable only if both sides carry text.
    pub fn is_complete(&self) -> bool {
        !self.input.trim().is_empty() && !self.expected_output.trim().is_empty()
    }
}
