//! Prompt mutation: initial drafting, targeted repair and strategic evolution.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{OptimizerError, OptimizerResult};
use crate::domain::models::{
    CandidateOrigin, FailingCase, FeedbackSummary, ModelsConfig, PromptCandidate, Role, TestCase,
};
use crate::domain::ports::{CompletionProvider, Sleeper, TokioSleeper};
use crate::services::prompts::{render, PromptTemplates};
use crate::services::rate_limiter::RollingWindowLimiter;
use crate::services::retry::RetryPolicy;

/// Produces new prompt candidates through the provider.
///
/// Each operation is a single request/response; the mutator never sees the
/// run history.
pub struct PromptMutator {
    provider: Arc<dyn CompletionProvider>,
    models: ModelsConfig,
    templates: PromptTemplates,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    limiter: Option<RollingWindowLimiter>,
}

impl PromptMutator {
    /// Create a mutator; calls are unthrottled until a limiter is attached.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        models: ModelsConfig,
        templates: PromptTemplates,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            models,
            templates,
            retry,
            sleeper: Arc::new(TokioSleeper),
            limiter: None,
        }
    }

    /// Replace the timer used for retry backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Count every attempt against `limiter`.
    pub fn with_rate_limiter(mut self, limiter: RollingWindowLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Draft the first candidate from the use case and one labeled sample.
    ///
    /// There is no earlier prompt to fall back on, so exhausted retries are
    /// an error here.
    #[instrument(skip_all)]
    pub async fn initial(
        &self,
        use_case: &str,
        sample: &TestCase,
    ) -> OptimizerResult<PromptCandidate> {
        let request = render(
            &self.templates.initial_prompt_generator,
            &[
                ("use_case", use_case),
                ("input_data", sample.input.as_str()),
                ("output_data", sample.expected_output.as_str()),
            ],
        );

        let response = self
            .call(Role::InitialPromptGenerator, &request)
            .await?
            .ok_or_else(|| OptimizerError::ProviderExhausted {
                stage: Role::InitialPromptGenerator.to_string(),
                attempts: self.retry.max_retries + 1,
                message: "could not generate an initial prompt".to_string(),
            })?;

        let text = extract_prompt(&response);
        let text = if text.is_empty() {
            warn!("initial prompt response was empty, using the use case as prompt");
            use_case.trim().to_string()
        } else {
            text
        };

        info!(length = text.len(), "initial prompt generated");
        Ok(PromptCandidate::initial(text))
    }

    /// Repair `current` so it handles one failing case.
    #[instrument(
        skip_all,
        fields(iteration = current.iteration, case_index = failing.case_index)
    )]
    pub async fn quick_fix(
        &self,
        current: &PromptCandidate,
        failing: &FailingCase,
    ) -> OptimizerResult<PromptCandidate> {
        let actual = failing.error.as_ref().map_or_else(
            || failing.actual.clone(),
            |error| format!("(no output, provider error: {error})"),
        );
        let request = render(
            &self.templates.prompt_optimizer,
            &[
                ("prompt", current.text.as_str()),
                ("input_data", failing.input.as_str()),
                ("expected_output", failing.expected.as_str()),
                ("actual_output", actual.as_str()),
                ("reason", failing.reason.as_deref().unwrap_or("not given")),
            ],
        );

        let response = self.call(Role::PromptOptimizer, &request).await?;
        Ok(self.successor(
            current,
            response.as_deref(),
            CandidateOrigin::QuickFix,
        ))
    }

    /// Restructure `current` using synthesized feedback.
    #[instrument(skip_all, fields(iteration = current.iteration))]
    pub async fn evolve(
        &self,
        current: &PromptCandidate,
        feedback: &FeedbackSummary,
    ) -> OptimizerResult<PromptCandidate> {
        let feedback_text = feedback.render();
        let success_rate = format!("{:.1}", feedback.latest_success_rate);
        let iteration = current.iteration.to_string();
        let request = render(
            &self.templates.prompt_evolver,
            &[
                ("prompt", current.text.as_str()),
                ("feedback", feedback_text.as_str()),
                ("success_rate", success_rate.as_str()),
                ("iteration", iteration.as_str()),
            ],
        );

        let response = self.call(Role::PromptEvolver, &request).await?;
        Ok(self.successor(
            current,
            response.as_deref(),
            CandidateOrigin::Evolved,
        ))
    }

    fn successor(
        &self,
        current: &PromptCandidate,
        response: Option<&str>,
        origin: CandidateOrigin,
    ) -> PromptCandidate {
        let text = response.map(extract_prompt).unwrap_or_default();
        if text.is_empty() {
            debug!(%origin, "no new prompt text, carrying the current prompt forward");
            return current.successor(current.text.clone(), origin);
        }
        current.successor(text, origin)
    }

    /// `Ok(None)` when transient retries ran out.
    async fn call(&self, role: Role, request: &str) -> OptimizerResult<Option<String>> {
        let binding = &self.models.binding(role);
        let outcome = self
            .retry
            .execute(self.sleeper.as_ref(), |_| async move {
                if let Some(limiter) = &self.limiter {
                    limiter.acquire().await;
                }
                self.provider.complete(request, "", binding).await
            })
            .await;

        match outcome.result {
            Ok(response) => Ok(Some(response)),
            Err(err) if err.is_transient() => {
                warn!(%role, attempts = outcome.attempts, error = %err, "mutation call gave up");
                Ok(None)
            }
            Err(err) => Err(OptimizerError::from_provider(
                role.as_str(),
                &err,
                outcome.attempts,
            )),
        }
    }
}

/// Pull the prompt out of `START <prompt> ... </prompt> END`.
///
/// Markers match case-insensitively with optional whitespace between them.
/// Without markers the whole trimmed response is the prompt.
pub fn extract_prompt(response: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `response`
    let lower = response.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("start") {
        let start = search_from + found;
        search_from = start + "start".len();

        let after_start = skip_whitespace(&lower, search_from);
        if !lower[after_start..].starts_with("<prompt>") {
            continue;
        }
        let content_start = after_start + "<prompt>".len();

        let mut close_from = content_start;
        while let Some(found) = lower[close_from..].find("</prompt>") {
            let close = close_from + found;
            let after_close = skip_whitespace(&lower, close + "</prompt>".len());
            if lower[after_close..].starts_with("end") {
                return response[content_start..close].trim().to_string();
            }
            close_from = close + "</prompt>".len();
        }
    }

    response.trim().to_string()
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(text.len(), |(offset, _)| from + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::ScriptedProvider;
    use crate::domain::errors::ProviderError;
    use crate::services::retry::tests::RecordingSleeper;
    use std::time::Duration;

    fn mutator(provider: ScriptedProvider) -> PromptMutator {
        PromptMutator::new(
            Arc::new(provider),
            ModelsConfig::default(),
            PromptTemplates::default(),
            RetryPolicy::new(2, Duration::from_secs(1), true),
        )
        .with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    fn failing() -> FailingCase {
        FailingCase {
            case_index: 2,
            input: "not bad".to_string(),
            expected: "positive".to_string(),
            actual: "negative".to_string(),
            reason: Some("double negation".to_string()),
            error: None,
        }
    }

    #[test]
    fn test_extract_prompt_with_markers() {
        let response =
            "Here you go:\nSTART <prompt>\nClassify the sentiment.\n</prompt> END\nThanks";
        assert_eq!(extract_prompt(response), "Classify the sentiment.");
    }

    #[test]
    fn test_extract_prompt_case_insensitive_and_spacing() {
        let response = "start\n  <PROMPT>Answer with one word.</Prompt>\n\n end";
        assert_eq!(extract_prompt(response), "Answer with one word.");
    }

    #[test]
    fn test_extract_prompt_skips_close_not_followed_by_end() {
        let response = "START <prompt>Use </prompt> tags literally.</prompt> END";
        assert_eq!(extract_prompt(response), "Use </prompt> tags literally.");
    }

    #[test]
    fn test_extract_prompt_without_markers() {
        assert_eq!(
            extract_prompt("  Just classify it.  \n"),
            "Just classify it."
        );
        assert_eq!(
            extract_prompt("Restart <prompt> missing close"),
            "Restart <prompt> missing close"
        );
    }

    #[tokio::test]
    async fn test_initial_uses_generator_role_and_sample() {
        let provider = ScriptedProvider::constant("START <prompt>Label reviews.</prompt> END");
        let log = provider.call_log();
        let mutator = mutator(provider);

        let candidate = mutator
            .initial(
                "sentiment of movie reviews",
                &TestCase::new("great film", "positive"),
            )
            .await
            .unwrap();

        assert_eq!(candidate.text, "Label reviews.");
        assert_eq!(candidate.iteration, 1);
        assert_eq!(candidate.origin, CandidateOrigin::Initial);

        let calls = log.lock().unwrap();
        assert_eq!(calls[0].role, Role::InitialPromptGenerator);
        assert!(calls[0].prompt.contains("sentiment of movie reviews"));
        assert!(calls[0].prompt.contains("great film"));
        assert!(calls[0].prompt.contains("positive"));
    }

    #[tokio::test]
    async fn test_initial_exhausted_is_error() {
        let provider = ScriptedProvider::new(|_| Err(ProviderError::transient("503")));
        let mutator = mutator(provider);
        let err = mutator
            .initial("anything", &TestCase::new("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::ProviderExhausted { .. }));
    }

    #[tokio::test]
    async fn test_quick_fix_describes_failure() {
        let provider =
            ScriptedProvider::constant("START <prompt>Handle double negation.</prompt> END");
        let log = provider.call_log();
        let mutator = mutator(provider);
        let current = PromptCandidate::initial("Classify.");

        let next = mutator.quick_fix(&current, &failing()).await.unwrap();

        assert_eq!(next.text, "Handle double negation.");
        assert_eq!(next.iteration, 2);
        assert_eq!(next.origin, CandidateOrigin::QuickFix);

        let calls = log.lock().unwrap();
        assert_eq!(calls[0].role, Role::PromptOptimizer);
        assert!(calls[0].prompt.contains("Classify."));
        assert!(calls[0].prompt.contains("not bad"));
        assert!(calls[0].prompt.contains("double negation"));
    }

    #[tokio::test]
    async fn test_quick_fix_exhausted_carries_prompt_forward() {
        let provider = ScriptedProvider::new(|_| Err(ProviderError::transient("429")));
        let mutator = mutator(provider);
        let current = PromptCandidate::initial("Classify.");

        let next = mutator.quick_fix(&current, &failing()).await.unwrap();

        assert_eq!(next.text, "Classify.");
        assert_eq!(next.iteration, 2);
    }

    #[tokio::test]
    async fn test_empty_response_keeps_current_text() {
        let mutator = mutator(ScriptedProvider::constant("START <prompt>  </prompt> END"));
        let current = PromptCandidate::initial("Classify.");

        let next = mutator.quick_fix(&current, &failing()).await.unwrap();
        assert_eq!(next.text, "Classify.");
    }

    #[tokio::test]
    async fn test_evolve_fatal_propagates() {
        let mutator = mutator(ScriptedProvider::new(|_| Err(ProviderError::fatal("401"))));
        let summary = FeedbackSummary {
            iterations: vec![1, 2, 3],
            mean_success_rate: 40.0,
            latest_success_rate: 50.0,
            clusters: Vec::new(),
            persistent_failures: Vec::new(),
            analysis: String::new(),
        };

        let err = mutator
            .evolve(&PromptCandidate::initial("p"), &summary)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::ProviderFatal { ref stage, .. } if stage == "prompt_evolver"
        ));
    }

    #[tokio::test]
    async fn test_evolve_sends_rendered_feedback() {
        let provider = ScriptedProvider::constant("START <prompt>Evolved.</prompt> END");
        let log = provider.call_log();
        let mutator = mutator(provider);
        let summary = FeedbackSummary {
            iterations: vec![1, 2, 3],
            mean_success_rate: 40.0,
            latest_success_rate: 50.0,
            clusters: Vec::new(),
            persistent_failures: vec![4],
            analysis: "Too verbose.".to_string(),
        };
        let current = PromptCandidate::initial("p").successor("p2", CandidateOrigin::QuickFix);

        let next = mutator.evolve(&current, &summary).await.unwrap();

        assert_eq!(next.origin, CandidateOrigin::Evolved);
        assert_eq!(next.iteration, 3);
        let calls = log.lock().unwrap();
        assert_eq!(calls[0].role, Role::PromptEvolver);
        assert!(calls[0].prompt.contains("Too verbose."));
        assert!(calls[0].prompt.contains("iteration 2"));
    }
}
