//! Feedback synthesis across a window of evaluation runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{OptimizerError, OptimizerResult};
use crate::domain::models::{
    EvaluationRun, FailingCase, FailureCause, FailureCluster, FeedbackSummary, PromptCandidate,
    RoleBinding,
};
use crate::domain::ports::{CompletionProvider, Sleeper, TokioSleeper};
use crate::services::prompts::render;
use crate::services::rate_limiter::RollingWindowLimiter;
use crate::services::retry::RetryPolicy;
use crate::services::scorer::normalize;

/// Failed cases shown to the feedback collector.
const SAMPLE_FAILURES: usize = 5;

/// Aggregates failures over recent runs and asks the feedback collector for
/// an analysis.
pub struct FeedbackSynthesizer {
    provider: Arc<dyn CompletionProvider>,
    role: RoleBinding,
    template: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    limiter: Option<RollingWindowLimiter>,
    edge_case_max_words: usize,
}

impl FeedbackSynthesizer {
    /// Create a synthesizer; inputs of at most `edge_case_max_words` words
    /// count as edge cases when classifying failures.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        role: RoleBinding,
        template: impl Into<String>,
        retry: RetryPolicy,
        edge_case_max_words: usize,
    ) -> Self {
        Self {
            provider,
            role,
            template: template.into(),
            retry,
            sleeper: Arc::new(TokioSleeper),
            limiter: None,
            edge_case_max_words,
        }
    }

    /// Replace the timer used for retry backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Count every analysis attempt against `limiter`.
    pub fn with_rate_limiter(mut self, limiter: RollingWindowLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Summarize `window` (oldest first) for `candidate`.
    #[instrument(
        skip_all,
        fields(iteration = candidate.iteration, window = window.len())
    )]
    pub async fn synthesize(
        &self,
        candidate: &PromptCandidate,
        window: &[&EvaluationRun],
    ) -> OptimizerResult<FeedbackSummary> {
        let mut summary = self.aggregate(window);

        let Some(latest) = window.last() else {
            return Ok(summary);
        };

        let prompt = self.render_request(candidate, latest, &summary);
        let prompt = prompt.as_str();
        let outcome = self
            .retry
            .execute(self.sleeper.as_ref(), |_| async move {
                if let Some(limiter) = &self.limiter {
                    limiter.acquire().await;
                }
                self.provider.complete(prompt, "", &self.role).await
            })
            .await;

        match outcome.result {
            Ok(analysis) => summary.analysis = analysis.trim().to_string(),
            Err(err) if err.is_transient() => {
                warn!(attempts = outcome.attempts, error = %err, "feedback analysis unavailable");
            }
            Err(err) => {
                return Err(OptimizerError::from_provider(
                    "feedback",
                    &err,
                    outcome.attempts,
                ));
            }
        }

        info!(
            clusters = summary.clusters.len(),
            persistent = summary.persistent_failures.len(),
            dominant = ?summary.dominant_cause(),
            "feedback synthesized"
        );
        Ok(summary)
    }

    /// Everything in the summary except the provider analysis.
    pub fn aggregate(&self, window: &[&EvaluationRun]) -> FeedbackSummary {
        let iterations: Vec<u32> = window
            .iter()
            .map(|run| run.iteration)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mean_success_rate = if window.is_empty() {
            0.0
        } else {
            let total: f64 = window.iter().map(|run| run.metrics.success_rate).sum();
            total / window.len() as f64
        };
        let latest_success_rate = window.last().map_or(0.0, |run| run.metrics.success_rate);

        let mut grouped: BTreeMap<FailureCause, (usize, BTreeSet<usize>, &FailingCase)> =
            BTreeMap::new();
        for run in window {
            for failure in &run.failing_cases {
                let cause = self.classify(failure);
                let entry = grouped
                    .entry(cause)
                    .or_insert_with(|| (0, BTreeSet::new(), failure));
                entry.0 += 1;
                entry.1.insert(failure.case_index);
                entry.2 = failure;
            }
        }

        let mut clusters: Vec<FailureCluster> = grouped
            .into_iter()
            .map(|(cause, (occurrences, indices, example))| FailureCluster {
                cause,
                occurrences,
                case_indices: indices.into_iter().collect(),
                example: example.clone(),
            })
            .collect();
        clusters.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

        let persistent_failures = persistent_failures(window);
        debug!(
            persistent = persistent_failures.len(),
            "aggregated failures across window"
        );

        FeedbackSummary {
            iterations,
            mean_success_rate,
            latest_success_rate,
            clusters,
            persistent_failures,
            analysis: String::new(),
        }
    }

    /// First matching rule wins.
    pub fn classify(&self, failure: &FailingCase) -> FailureCause {
        if failure.error.is_some() {
            return FailureCause::ProviderError;
        }

        let actual = normalize(&failure.actual, false);
        let expected = normalize(&failure.expected, false);

        if actual.is_empty() {
            FailureCause::EmptyOutput
        } else if alphanumeric(&actual) == alphanumeric(&expected) {
            FailureCause::FormatMismatch
        } else if !expected.is_empty() && actual.contains(&expected) {
            FailureCause::ExtraContent
        } else if expected.contains(&actual) {
            FailureCause::IncompleteAnswer
        } else if failure.input.split_whitespace().count() <= self.edge_case_max_words {
            FailureCause::BoundaryAmbiguity
        } else {
            FailureCause::WrongAnswer
        }
    }

    fn render_request(
        &self,
        candidate: &PromptCandidate,
        latest: &EvaluationRun,
        summary: &FeedbackSummary,
    ) -> String {
        let mut failed_cases = String::new();
        for failure in latest.failing_cases.iter().take(SAMPLE_FAILURES) {
            let _ = writeln!(
                failed_cases,
                "Input: {}\nExpected: {}\nGot: {}\n---",
                failure.input,
                failure.expected,
                failure.error.as_deref().unwrap_or(&failure.actual)
            );
        }

        let mut clusters = String::new();
        for cluster in &summary.clusters {
            let _ = writeln!(
                clusters,
                "- {}: {} occurrence(s), cases {:?}",
                cluster.cause, cluster.occurrences, cluster.case_indices
            );
        }
        if clusters.is_empty() {
            clusters.push_str("none\n");
        }

        let success_rate = format!("{:.1}", latest.metrics.success_rate);
        let successful_cases = latest.metrics.matched_cases.to_string();
        let total_cases = latest.metrics.total_cases.to_string();
        let iterations = summary.iterations.len().to_string();

        render(
            &self.template,
            &[
                ("prompt", candidate.text.as_str()),
                ("success_rate", success_rate.as_str()),
                ("successful_cases", successful_cases.as_str()),
                ("total_cases", total_cases.as_str()),
                ("iterations", iterations.as_str()),
                ("clusters", clusters.trim_end()),
                ("failed_cases", failed_cases.trim_end()),
            ],
        )
    }
}

/// Case indices that fail in every run of the window.
fn persistent_failures(window: &[&EvaluationRun]) -> Vec<usize> {
    let mut runs = window.iter();
    let Some(first) = runs.next() else {
        return Vec::new();
    };

    let mut common: BTreeSet<usize> = first.failing_cases.iter().map(|f| f.case_index).collect();
    for run in runs {
        let failing: BTreeSet<usize> = run.failing_cases.iter().map(|f| f.case_index).collect();
        common = common.intersection(&failing).copied().collect();
    }
    common.into_iter().collect()
}

fn alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}
