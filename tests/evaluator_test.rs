//! Concurrent evaluator behavior through the public API.

mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{cases, InstantSleeper};
use golden_prompt::adapters::providers::ScriptedProvider;
use golden_prompt::domain::errors::ProviderError;
use golden_prompt::domain::models::{
    MatchingConfig, ModelConfig, PerformanceConfig, PromptCandidate, Role, RoleBinding, RunKind,
    ScoringConfig,
};
use golden_prompt::domain::ports::CompletionProvider;
use golden_prompt::services::{ConcurrentEvaluator, QualityScorer};

/// Provider that tracks how many calls are in flight and logs call
/// boundaries as `(case index, started)`.
#[derive(Default)]
struct GaugeProvider {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    events: Mutex<Vec<(usize, bool)>>,
}

#[async_trait]
impl CompletionProvider for GaugeProvider {
    fn name(&self) -> &'static str {
        "gauge"
    }

    async fn complete(
        &self,
        _prompt: &str,
        input: &str,
        _role: &RoleBinding,
    ) -> Result<String, ProviderError> {
        let index: usize = input.trim_start_matches("in").parse().unwrap_or(0);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push((index, true));

        tokio::time::sleep(Duration::from_millis(10 + (index as u64 % 3) * 5)).await;

        self.events.lock().unwrap().push((index, false));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("out{index}"))
    }
}

fn gauge_evaluator(
    gauge: &Arc<GaugeProvider>,
    workers: usize,
    batch: usize,
) -> ConcurrentEvaluator {
    ConcurrentEvaluator::new(
        gauge.clone(),
        RoleBinding::new(Role::AnswerGenerator, ModelConfig::anthropic("test-model")),
        PerformanceConfig {
            max_workers: workers,
            batch_size: batch,
            api_rate_limit: 10_000,
            ..Default::default()
        },
        QualityScorer::new(MatchingConfig::default(), ScoringConfig::default()),
    )
}

fn echo_world() -> ScriptedProvider {
    ScriptedProvider::new(|call| Ok(call.input.replace("in", "out")))
        // later cases finish first
        .with_latency(|call| {
            let index: u64 = call.input.trim_start_matches("in").parse().unwrap_or(0);
            Duration::from_millis(40u64.saturating_sub(index * 3))
        })
}

fn evaluator(provider: ScriptedProvider, performance: PerformanceConfig) -> ConcurrentEvaluator {
    ConcurrentEvaluator::new(
        Arc::new(provider),
        RoleBinding::new(Role::AnswerGenerator, ModelConfig::anthropic("test-model")),
        performance,
        QualityScorer::new(MatchingConfig::default(), ScoringConfig::default()),
    )
}

#[tokio::test]
async fn test_results_ordered_at_every_concurrency_level() {
    let dataset = cases(12);
    for (parallel, workers, batch) in [(false, 1, 10), (true, 1, 10), (true, 3, 4), (true, 12, 1)] {
        let performance = PerformanceConfig {
            enable_parallel: parallel,
            max_workers: workers,
            batch_size: batch,
            api_rate_limit: 10_000,
            ..Default::default()
        };

        let run = evaluator(echo_world(), performance)
            .evaluate(
                &PromptCandidate::initial("echo"),
                &dataset,
                RunKind::Optimization,
                &[],
            )
            .await
            .unwrap();

        assert_eq!(run.per_case_results.len(), dataset.len());
        for (i, result) in run.per_case_results.iter().enumerate() {
            assert_eq!(result.case_index, i);
            assert_eq!(result.generated_output, format!("out{i}"));
        }
        assert!((run.metrics.success_rate - 100.0).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_retry_waits_two_then_four_seconds() {
    let attempts = Arc::new(AtomicU32::new(0));
    let provider = {
        let attempts = attempts.clone();
        ScriptedProvider::new(move |_| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::transient("rate limited"))
            } else {
                Ok("out0".to_string())
            }
        })
    };
    let sleeper = Arc::new(InstantSleeper::default());
    let evaluator = evaluator(
        provider,
        PerformanceConfig {
            max_retries: 3,
            retry_delay: 2.0,
            exponential_backoff: true,
            ..Default::default()
        },
    )
    .with_sleeper(sleeper.clone());

    let run = evaluator
        .evaluate(
            &PromptCandidate::initial("p"),
            &cases(1),
            RunKind::Optimization,
            &[],
        )
        .await
        .unwrap();

    assert!(run.per_case_results[0].matched);
    assert_eq!(run.per_case_results[0].attempts, 3);
    assert_eq!(
        *sleeper.sleeps.lock().unwrap(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(sleeper.total(), Duration::from_secs(6));
}

#[tokio::test]
async fn test_exhausted_case_counts_as_failure() {
    let provider = ScriptedProvider::new(|call| {
        if call.input == "in1" {
            Err(ProviderError::transient("server overloaded"))
        } else {
            Ok(call.input.replace("in", "out"))
        }
    });
    let evaluator = evaluator(
        provider,
        PerformanceConfig {
            max_retries: 2,
            ..Default::default()
        },
    )
    .with_sleeper(Arc::new(InstantSleeper::default()));

    let run = evaluator
        .evaluate(
            &PromptCandidate::initial("p"),
            &cases(4),
            RunKind::Optimization,
            &[],
        )
        .await
        .unwrap();

    assert_eq!(run.metrics.matched_cases, 3);
    assert!((run.metrics.success_rate - 75.0).abs() < 1e-9);
    let failed = &run.per_case_results[1];
    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.error.as_deref(), Some("server overloaded"));
    assert_eq!(run.failing_cases.len(), 1);
    assert_eq!(run.failing_cases[0].case_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_calls_never_exceed_max_workers() {
    let gauge = Arc::new(GaugeProvider::default());

    let run = gauge_evaluator(&gauge, 3, 20)
        .evaluate(
            &PromptCandidate::initial("p"),
            &cases(20),
            RunKind::Optimization,
            &[],
        )
        .await
        .unwrap();

    assert_eq!(run.metrics.matched_cases, 20);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    assert_eq!(gauge.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_finishes_before_next_batch_starts() {
    let gauge = Arc::new(GaugeProvider::default());

    gauge_evaluator(&gauge, 4, 2)
        .run_cases(&PromptCandidate::initial("p"), &cases(7))
        .await
        .unwrap();

    // batch size below the worker count caps concurrency at the batch size
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);

    let events = gauge.events.lock().unwrap().clone();
    assert_eq!(events.len(), 14);
    for (position, &(index, started)) in events.iter().enumerate() {
        if !started {
            continue;
        }
        let batch = index / 2;
        let earlier_batches_done = (0..batch * 2).all(|earlier| {
            events[..position]
                .iter()
                .any(|&(case, started)| case == earlier && !started)
        });
        assert!(
            earlier_batches_done,
            "case {index} started before batch {batch} could begin"
        );
    }
}
