//! Common test utilities for integration tests
//!
//! Provides shared fixtures and a scripted provider world used across
//! multiple integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use golden_prompt::adapters::providers::ScriptedProvider;
use golden_prompt::domain::models::{Config, Role, TestCase};
use golden_prompt::domain::ports::Sleeper;

/// Sleeper that returns immediately and remembers every delay.
#[derive(Debug, Default)]
pub struct InstantSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn total(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// `n` cases mapping `in{i}` to `out{i}`.
pub fn cases(n: usize) -> Vec<TestCase> {
    (0..n)
        .map(|i| TestCase::new(format!("in{i}"), format!("out{i}")))
        .collect()
}

/// Configuration with a generous rate limit and no retry delay.
pub fn config(max_iterations: u32, validation_passes: Option<u32>) -> Config {
    let mut config = Config::default();
    config.optimization.max_iterations = max_iterations;
    config.optimization.target_success_rate = 100.0;
    config.optimization.feedback_frequency = 3;
    config.confidence_validation.enabled = validation_passes.is_some();
    config.confidence_validation.required_consecutive_passes = validation_passes.unwrap_or(3);
    config.performance.api_rate_limit = 10_000;
    config.performance.max_workers = 4;
    config.performance.retry_delay = 0.0;
    config
}

/// A provider where every mutation yields `prompt v{n+1}` and answers are
/// graded by prompt version.
///
/// Case `i` is answered correctly when `i < grader(version, round)`, where
/// `round` counts earlier evaluations of the same prompt text.
pub fn versioned_world<G>(case_count: usize, grader: G) -> ScriptedProvider
where
    G: Fn(u32, usize) -> usize + Send + Sync + 'static,
{
    let latest_version = Arc::new(AtomicU32::new(1));
    let answer_calls: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    ScriptedProvider::new(move |call| match call.role {
        Role::PromptOptimizer | Role::PromptEvolver | Role::InitialPromptGenerator => {
            let version = latest_version.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("START <prompt>prompt v{version}</prompt> END"))
        }
        Role::FeedbackCollector => Ok("The prompt ignores the output format.".to_string()),
        Role::AnswerGenerator => {
            let version: u32 = call
                .prompt
                .trim_start_matches("prompt v")
                .parse()
                .unwrap_or(0);
            let round = {
                let mut counts = answer_calls.lock().unwrap();
                let count = counts.entry(call.prompt.clone()).or_insert(0);
                *count += 1;
                (*count - 1) / case_count
            };
            let index: usize = call
                .input
                .trim_start_matches("in")
                .parse()
                .unwrap_or(usize::MAX);
            if index < grader(version, round) {
                Ok(format!("out{index}"))
            } else {
                Ok("wrong".to_string())
            }
        }
    })
}
