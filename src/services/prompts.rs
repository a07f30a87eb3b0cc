//! Meta-prompt templates for every role.
//!
//! Templates use `{name}` placeholders. Placeholders without a value are
//! left untouched, so literal braces in a template survive rendering.

use serde::Deserialize;
use std::path::Path;

use crate::domain::errors::ConfigError;
use crate::domain::models::Role;

const INITIAL_PROMPT_GENERATOR: &str = r"You are an expert prompt engineer.

Write a prompt for the following use case:
{use_case}

Example input:
{input_data}

Expected output for that input:
{output_data}

The prompt will be sent as the system instruction and the input as the user
message. The model must answer with the expected output only, in exactly the
same format, with no explanation or extra text.

Return the prompt between markers:
START <prompt>
...your prompt...
</prompt> END";

const ANSWER_GENERATOR: &str = "{prompt}";

const PROMPT_OPTIMIZER: &str = r"You are an expert prompt engineer improving a prompt that produced a wrong answer.

Current prompt:
{prompt}

Input:
{input_data}

Expected output:
{expected_output}

Actual output:
{actual_output}

Why this output was expected:
{reason}

Revise the prompt so that it produces the expected output for this input and
inputs like it, without breaking cases it already handles. Keep what works.

Return the revised prompt between markers:
START <prompt>
...revised prompt...
</prompt> END";

const FEEDBACK_COLLECTOR: &str = r"You are reviewing how a prompt performed over the last {iterations} iterations.

Prompt:
{prompt}

Success rate: {success_rate}% ({successful_cases}/{total_cases} cases)

Failure patterns:
{clusters}

Sample failures:
{failed_cases}

Analyze the root causes of these failures. Identify patterns, ambiguous
instructions, missing edge-case handling and output-format problems. Give
concrete, actionable recommendations.";

const PROMPT_EVOLVER: &str = r"You are an expert prompt engineer evolving a prompt at iteration {iteration}.

Current prompt (success rate {success_rate}%):
{prompt}

Feedback from recent iterations:
{feedback}

Restructure the prompt to address the feedback. You may reorganize it
completely, add rules or examples, and tighten the output format.

Return the evolved prompt between markers:
START <prompt>
...evolved prompt...
</prompt> END";

/// Template set keyed by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    /// Drafts the first prompt from `{use_case}`, `{input_data}` and `{output_data}`
    pub initial_prompt_generator: String,
    /// Wraps a candidate as `{prompt}` before it is sent
    pub answer_generator: String,
    /// Repairs `{prompt}` for one failing case
    pub prompt_optimizer: String,
    /// Asks for an analysis of `{failed_cases}` across iterations
    pub feedback_collector: String,
    /// Restructures `{prompt}` from `{feedback}`
    pub prompt_evolver: String,
}

/// On-disk form; missing keys fall back to built-ins.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct PromptsFile {
    initial_prompt_generator: Option<String>,
    answer_generator: Option<String>,
    prompt_optimizer: Option<String>,
    feedback_collector: Option<String>,
    prompt_evolver: Option<String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            initial_prompt_generator: INITIAL_PROMPT_GENERATOR.to_string(),
            answer_generator: ANSWER_GENERATOR.to_string(),
            prompt_optimizer: PROMPT_OPTIMIZER.to_string(),
            feedback_collector: FEEDBACK_COLLECTOR.to_string(),
            prompt_evolver: PROMPT_EVOLVER.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Parse a YAML template file body.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let file: Option<PromptsFile> = serde_yaml::from_str(yaml)?;
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Ok(Self {
            initial_prompt_generator: file
                .initial_prompt_generator
                .unwrap_or(defaults.initial_prompt_generator),
            answer_generator: file.answer_generator.unwrap_or(defaults.answer_generator),
            prompt_optimizer: file.prompt_optimizer.unwrap_or(defaults.prompt_optimizer),
            feedback_collector: file.feedback_collector.unwrap_or(defaults.feedback_collector),
            prompt_evolver: file.prompt_evolver.unwrap_or(defaults.prompt_evolver),
        })
    }

    /// Load templates from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidPromptsFile {
            path: path.display().to_string(),
            reason,
        };
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| invalid(e.to_string()))?;
        Self::from_yaml_str(&yaml).map_err(|e| invalid(e.to_string()))
    }

    /// Built-ins, or the configured file when one is set.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Template used for `role`.
    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::InitialPromptGenerator => &self.initial_prompt_generator,
            Role::AnswerGenerator => &self.answer_generator,
            Role::PromptOptimizer => &self.prompt_optimizer,
            Role::FeedbackCollector => &self.feedback_collector,
            Role::PromptEvolver => &self.prompt_evolver,
        }
    }
}

/// Substitute `{key}` placeholders in a single pass.
///
/// Substituted values are never re-scanned, so a value containing `{key}`
/// text is inserted verbatim.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        let replaced = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (close, *value))
        });

        match replaced {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
