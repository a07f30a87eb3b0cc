//! Concurrent evaluation of a prompt candidate against the dataset.
//!
//! Cases are dispatched batch by batch onto a bounded worker pool. Every
//! request goes through the evaluator's rolling-window rate limiter, which
//! lives as long as the evaluator, so consecutive evaluations draw on the
//! same budget. Retries are local to a case and results are reassembled in
//! case order before scoring. When the pool cannot be used the remaining
//! cases run sequentially with the same policies.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OptimizerError, OptimizerResult, ProviderError};
use crate::domain::models::{
    CaseResult, EvaluationRun, PerformanceConfig, PromptCandidate, RoleBinding, RunKind, TestCase,
};
use crate::domain::ports::{CompletionProvider, Sleeper, TokioSleeper};
use crate::services::prompts::{render, PromptTemplates};
use crate::services::rate_limiter::RollingWindowLimiter;
use crate::services::retry::RetryPolicy;
use crate::services::scorer::QualityScorer;

/// Everything a worker needs to run one case.
struct CaseContext {
    provider: Arc<dyn CompletionProvider>,
    role: RoleBinding,
    prompt: String,
    scorer: Arc<QualityScorer>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    limiter: RollingWindowLimiter,
}

/// A fatal provider error that must abort the evaluation.
#[derive(Debug)]
struct CaseAbort {
    error: ProviderError,
    attempts: u32,
}

/// Runs a candidate against every test case under worker, rate and retry limits.
pub struct ConcurrentEvaluator {
    provider: Arc<dyn CompletionProvider>,
    answer_role: RoleBinding,
    performance: PerformanceConfig,
    retry: RetryPolicy,
    scorer: Arc<QualityScorer>,
    sleeper: Arc<dyn Sleeper>,
    limiter: RollingWindowLimiter,
    answer_template: String,
}

impl ConcurrentEvaluator {
    /// Create an evaluator with its own `api_rate_limit` budget.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        answer_role: RoleBinding,
        performance: PerformanceConfig,
        scorer: QualityScorer,
    ) -> Self {
        let retry = RetryPolicy::from_config(&performance);
        let limiter = RollingWindowLimiter::per_minute(performance.api_rate_limit);
        Self {
            provider,
            answer_role,
            performance,
            retry,
            scorer: Arc::new(scorer),
            sleeper: Arc::new(TokioSleeper),
            limiter,
            answer_template: PromptTemplates::default().answer_generator,
        }
    }

    /// Wrap every candidate in the answer-generator template before sending.
    pub fn with_answer_template(mut self, template: impl Into<String>) -> Self {
        self.answer_template = template.into();
        self
    }

    /// Replace the timer used for retry backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Draw on `limiter` instead of the evaluator's own budget.
    pub fn with_rate_limiter(mut self, limiter: RollingWindowLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// The limiter every answer request waits on.
    pub const fn rate_limiter(&self) -> &RollingWindowLimiter {
        &self.limiter
    }

    /// Scorer applied to every run.
    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    /// Retry policy applied to every case.
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Evaluate `candidate` on every case and score the outcome.
    ///
    /// `repeats` are earlier runs of the same candidate; they feed the
    /// consistency score only.
    #[instrument(skip_all, fields(iteration = candidate.iteration, kind = ?kind))]
    pub async fn evaluate(
        &self,
        candidate: &PromptCandidate,
        cases: &[TestCase],
        kind: RunKind,
        repeats: &[&EvaluationRun],
    ) -> OptimizerResult<EvaluationRun> {
        let per_case_results = self.run_cases(candidate, cases).await?;

        let repeat_results: Vec<&[CaseResult]> = repeats
            .iter()
            .map(|run| run.per_case_results.as_slice())
            .collect();
        let report = self.scorer.score(&per_case_results, cases, &repeat_results);

        info!(
            success_rate = report.metrics.success_rate,
            overall_quality = report.metrics.overall_quality,
            matched = report.metrics.matched_cases,
            total = report.metrics.total_cases,
            "evaluation complete"
        );

        Ok(EvaluationRun {
            run_id: Uuid::new_v4(),
            candidate: candidate.clone(),
            kind,
            iteration: candidate.iteration,
            per_case_results,
            metrics: report.metrics,
            failing_cases: report.failing_cases,
            timestamp: Utc::now(),
        })
    }

    /// Run the candidate on every case; results are ordered by case index.
    pub async fn run_cases(
        &self,
        candidate: &PromptCandidate,
        cases: &[TestCase],
    ) -> OptimizerResult<Vec<CaseResult>> {
        if cases.is_empty() {
            return Err(OptimizerError::DatasetEmpty);
        }

        let ctx = Arc::new(CaseContext {
            provider: self.provider.clone(),
            role: self.answer_role.clone(),
            prompt: render(
                &self.answer_template,
                &[("prompt", candidate.text.as_str())],
            ),
            scorer: self.scorer.clone(),
            retry: self.retry,
            sleeper: self.sleeper.clone(),
            limiter: self.limiter.clone(),
        });

        let mut slots: Vec<Option<CaseResult>> = vec![None; cases.len()];

        if self.parallel_available() {
            self.run_parallel(&ctx, cases, &mut slots).await?;
        } else {
            debug!("worker pool unavailable, evaluating sequentially");
        }

        let missing: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect();
        if !missing.is_empty() && missing.len() < cases.len() {
            warn!(
                missing = missing.len(),
                "worker pool could not finish every case, falling back to sequential execution"
            );
        }
        for index in missing {
            let result = run_isolated(&ctx, index, &cases[index])
                .await
                .map_err(|abort| abort_error(&abort))?;
            slots[index] = Some(result);
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// The pool needs parallelism enabled, more than one worker and a tokio
    /// runtime to spawn onto.
    fn parallel_available(&self) -> bool {
        self.performance.enable_parallel
            && self.performance.max_workers > 1
            && tokio::runtime::Handle::try_current().is_ok()
    }

    async fn run_parallel(
        &self,
        ctx: &Arc<CaseContext>,
        cases: &[TestCase],
        slots: &mut [Option<CaseResult>],
    ) -> OptimizerResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.performance.max_workers));
        let batch_size = self.performance.batch_size.max(1);
        let indices: Vec<usize> = (0..cases.len()).collect();
        let batch_count = indices.len().div_ceil(batch_size);

        for (batch_number, batch) in indices.chunks(batch_size).enumerate() {
            debug!(
                batch = batch_number + 1,
                batches = batch_count,
                size = batch.len(),
                "dispatching batch"
            );

            let mut set = JoinSet::new();
            for &index in batch {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    // Remaining cases are picked up by the sequential pass
                    warn!("worker pool closed unexpectedly");
                    break;
                };

                let ctx = ctx.clone();
                let case = cases[index].clone();
                set.spawn(async move {
                    let _permit = permit;
                    (index, run_case(&ctx, index, &case).await)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, Ok(result))) => slots[index] = Some(result),
                    Ok((index, Err(abort))) => {
                        warn!(case_index = index, error = %abort.error, "aborting evaluation");
                        set.abort_all();
                        return Err(abort_error(&abort));
                    }
                    Err(join_error) => {
                        warn!(error = %join_error, "evaluation worker died");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Run one case with retries; only a fatal provider error is returned as `Err`.
async fn run_case(
    ctx: &CaseContext,
    index: usize,
    case: &TestCase,
) -> Result<CaseResult, CaseAbort> {
    let started = Instant::now();
    let input = case.input.as_str();

    let outcome = ctx
        .retry
        .execute(ctx.sleeper.as_ref(), |_| async move {
            ctx.limiter.acquire().await;
            ctx.provider.complete(&ctx.prompt, input, &ctx.role).await
        })
        .await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome.result {
        Ok(generated_output) => {
            let matched = ctx.scorer.matches(&generated_output, &case.expected_output);
            debug!(
                case_index = index,
                matched,
                attempts = outcome.attempts,
                "case evaluated"
            );
            Ok(CaseResult {
                case_index: index,
                generated_output,
                matched,
                match_method: ctx.scorer.method(),
                latency_ms,
                attempts: outcome.attempts,
                error: None,
            })
        }
        Err(error) if error.is_transient() => {
            warn!(
                case_index = index,
                attempts = outcome.attempts,
                error = %error,
                "case failed after retries"
            );
            Ok(failed_case(
                ctx,
                index,
                latency_ms,
                outcome.attempts,
                error.message().to_string(),
            ))
        }
        Err(error) => Err(CaseAbort {
            error,
            attempts: outcome.attempts,
        }),
    }
}

/// Run one case on its own task; a panic fails the case instead of the
/// evaluation.
async fn run_isolated(
    ctx: &Arc<CaseContext>,
    index: usize,
    case: &TestCase,
) -> Result<CaseResult, CaseAbort> {
    let task_ctx = ctx.clone();
    let task_case = case.clone();
    let started = Instant::now();

    let handle = tokio::spawn(async move { run_case(&task_ctx, index, &task_case).await });
    match handle.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            warn!(case_index = index, error = %join_error, "case panicked, recording as failed");
            let latency_ms = started.elapsed().as_millis() as u64;
            Ok(failed_case(
                ctx,
                index,
                latency_ms,
                1,
                format!("worker panicked: {join_error}"),
            ))
        }
    }
}

fn failed_case(
    ctx: &CaseContext,
    index: usize,
    latency_ms: u64,
    attempts: u32,
    error: String,
) -> CaseResult {
    CaseResult {
        case_index: index,
        generated_output: String::new(),
        matched: false,
        match_method: ctx.scorer.method(),
        latency_ms,
        attempts,
        error: Some(error),
    }
}

fn abort_error(abort: &CaseAbort) -> OptimizerError {
    OptimizerError::from_provider("evaluation", &abort.error, abort.attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::ScriptedProvider;
    use crate::domain::models::{MatchingConfig, ModelConfig, Role, ScoringConfig};
    use crate::services::retry::tests::RecordingSleeper;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase::new(format!("input {i}"), format!("output {i}")))
            .collect()
    }

    fn evaluator(
        provider: ScriptedProvider,
        performance: PerformanceConfig,
    ) -> ConcurrentEvaluator {
        ConcurrentEvaluator::new(
            Arc::new(provider),
            RoleBinding::new(Role::AnswerGenerator, ModelConfig::anthropic("test-model")),
            performance,
            QualityScorer::new(MatchingConfig::default(), ScoringConfig::default()),
        )
        .with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    fn echo_expected() -> ScriptedProvider {
        // "input N" -> "output N"
        ScriptedProvider::new(|call| Ok(call.input.replace("input", "output")))
    }

    #[tokio::test]
    async fn test_results_ordered_by_case_index() {
        // Later cases answer faster so completion order is reversed
        let provider = ScriptedProvider::new(|call| Ok(call.input.replace("input", "output")))
            .with_latency(|call| {
                let n: u64 = call.input.trim_start_matches("input ").parse().unwrap_or(0);
                Duration::from_millis(50u64.saturating_sub(n * 5))
            });
        let performance = PerformanceConfig {
            max_workers: 8,
            batch_size: 4,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);
        let candidate = PromptCandidate::initial("Answer.");

        let results = evaluator.run_cases(&candidate, &cases(10)).await.unwrap();

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.case_index, i);
            assert!(result.matched);
        }
    }

    #[tokio::test]
    async fn test_sequential_when_parallel_disabled() {
        let provider = echo_expected();
        let log = provider.call_log();
        let performance = PerformanceConfig {
            enable_parallel: false,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);

        let results = evaluator
            .run_cases(&PromptCandidate::initial("p"), &cases(5))
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        let inputs: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.input.clone())
            .collect();
        assert_eq!(
            inputs,
            (0..5).map(|i| format!("input {i}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_transient_failure_recorded_on_case() {
        let provider = ScriptedProvider::new(|call| {
            if call.input == "input 1" {
                Err(ProviderError::transient("503 overloaded"))
            } else {
                Ok(call.input.replace("input", "output"))
            }
        });
        let performance = PerformanceConfig {
            max_retries: 2,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);

        let run = evaluator
            .evaluate(
                &PromptCandidate::initial("p"),
                &cases(3),
                RunKind::Optimization,
                &[],
            )
            .await
            .unwrap();

        let failed = &run.per_case_results[1];
        assert!(!failed.matched);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.error.as_deref(), Some("503 overloaded"));
        assert!((run.metrics.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(run.failing_cases.len(), 1);
        assert_eq!(
            run.failing_cases[0].error.as_deref(),
            Some("503 overloaded")
        );
    }

    #[tokio::test]
    async fn test_retry_then_success_uses_backoff() {
        let attempts: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let seen = attempts.clone();
        let provider = ScriptedProvider::new(move |call| {
            let mut seen = seen.lock().unwrap();
            let count = seen.entry(call.input.clone()).or_insert(0);
            *count += 1;
            if *count <= 2 {
                Err(ProviderError::transient("rate limited"))
            } else {
                Ok(call.input.replace("input", "output"))
            }
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let performance = PerformanceConfig {
            enable_parallel: false,
            max_retries: 3,
            retry_delay: 2.0,
            exponential_backoff: true,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance).with_sleeper(sleeper.clone());

        let results = evaluator
            .run_cases(&PromptCandidate::initial("p"), &cases(1))
            .await
            .unwrap();

        assert!(results[0].matched);
        assert_eq!(results[0].attempts, 3);
        assert_eq!(sleeper.total(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_evaluation() {
        let provider = ScriptedProvider::new(|call| {
            if call.input == "input 2" {
                Err(ProviderError::fatal("invalid x-api-key"))
            } else {
                Ok(call.input.replace("input", "output"))
            }
        });
        let evaluator = evaluator(provider, PerformanceConfig::default());

        let err = evaluator
            .run_cases(&PromptCandidate::initial("p"), &cases(6))
            .await
            .unwrap_err();

        assert!(
            matches!(err, OptimizerError::ProviderFatal { ref stage, .. } if stage == "evaluation")
        );
    }

    #[tokio::test]
    async fn test_worker_panic_falls_back_to_sequential() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let provider = ScriptedProvider::new(move |call| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 && call.input == "input 0" {
                panic!("worker crashed");
            }
            Ok(call.input.replace("input", "output"))
        });
        let performance = PerformanceConfig {
            max_workers: 2,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);

        let results = evaluator
            .run_cases(&PromptCandidate::initial("p"), &cases(3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.matched));
        assert_eq!(results[0].case_index, 0);
    }

    #[tokio::test]
    async fn test_answer_template_wraps_candidate() {
        let provider = echo_expected();
        let log = provider.call_log();
        let evaluator = evaluator(provider, PerformanceConfig::default())
            .with_answer_template("Task: {prompt}\nAnswer tersely.");

        evaluator
            .run_cases(&PromptCandidate::initial("Classify."), &cases(1))
            .await
            .unwrap();

        assert_eq!(
            log.lock().unwrap()[0].prompt,
            "Task: Classify.\nAnswer tersely."
        );
    }

    #[tokio::test]
    async fn test_empty_dataset_rejected() {
        let evaluator = evaluator(echo_expected(), PerformanceConfig::default());
        let err = evaluator
            .run_cases(&PromptCandidate::initial("p"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::DatasetEmpty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_spreads_requests_over_window() {
        let provider = echo_expected();
        let log = provider.call_log();
        let performance = PerformanceConfig {
            max_workers: 4,
            api_rate_limit: 2,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);
        let start = Instant::now();

        let results = evaluator
            .run_cases(&PromptCandidate::initial("p"), &cases(5))
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(log.lock().unwrap().len(), 5);
        // 2 per minute: the fifth request starts two full windows later
        assert!(start.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_spans_consecutive_evaluations() {
        let provider = echo_expected();
        let log = provider.call_log();
        let performance = PerformanceConfig {
            max_workers: 2,
            api_rate_limit: 2,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);
        let candidate = PromptCandidate::initial("p");
        let start = Instant::now();

        evaluator.run_cases(&candidate, &cases(2)).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        evaluator.run_cases(&candidate, &cases(2)).await.unwrap();

        assert_eq!(log.lock().unwrap().len(), 4);
        // the second evaluation waits for the first one's starts to expire
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_repeated_panic_fails_only_that_case() {
        let provider = ScriptedProvider::new(|call| {
            if call.input == "input 1" {
                panic!("malformed case");
            }
            Ok(call.input.replace("input", "output"))
        });
        let performance = PerformanceConfig {
            max_workers: 2,
            ..Default::default()
        };
        let evaluator = evaluator(provider, performance);

        let results = evaluator
            .run_cases(&PromptCandidate::initial("p"), &cases(3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].matched);
        assert!(results[2].matched);
        assert!(!results[1].matched);
        assert!(results[1]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("panicked")));
    }
}
