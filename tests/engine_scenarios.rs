//! End-to-end optimization loop scenarios against a scripted provider.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{cases, config, versioned_world};
use golden_prompt::adapters::providers::ScriptedProvider;
use golden_prompt::domain::errors::{ConfigError, OptimizerError, ProviderError};
use golden_prompt::domain::models::{
    CandidateOrigin, Decision, EvaluationRun, IterationDecision, Role, RunKind, TerminationReason,
};
use golden_prompt::services::{InitialPrompt, OptimizationEngine, PromptTemplates, RunObserver};

fn engine(config: &golden_prompt::Config, world: &ScriptedProvider) -> OptimizationEngine {
    OptimizationEngine::from_config(config, Arc::new(world.clone()), PromptTemplates::default())
        .unwrap()
}

fn start() -> InitialPrompt {
    InitialPrompt::Supplied("prompt v1".to_string())
}

#[tokio::test]
async fn test_partial_success_on_first_iteration_quick_fixes() {
    let world = versioned_world(8, |_, _| 5);
    let result = engine(&config(2, None), &world)
        .run(start(), &cases(8))
        .await
        .unwrap();

    assert_eq!(result.decision_at(1), Some(Decision::QuickFix));
    assert!(
        (result.run_history[0].metrics.success_rate - 62.5).abs() < 1e-9
    );
    assert_eq!(
        result.run_history[1].candidate.origin,
        CandidateOrigin::QuickFix
    );
    assert_eq!(result.run_history[1].candidate.text, "prompt v2");

    let fixes = world.calls_for(Role::PromptOptimizer);
    assert_eq!(fixes.len(), 1);
    // the first failing case drives the fix
    assert!(fixes[0].prompt.contains("Input:\nin5\n"));
    assert!(fixes[0].prompt.contains("Current prompt:\nprompt v1"));

    assert_eq!(result.iterations, 2);
    assert_eq!(
        result.termination_reason,
        TerminationReason::IterationBudgetExhausted {
            quality_threshold_met: false
        }
    );
}

#[tokio::test]
async fn test_target_without_validation_terminates_on_that_iteration() {
    let world = versioned_world(8, |version, _| if version == 5 { 8 } else { 5 });
    let result = engine(&config(10, None), &world)
        .run(start(), &cases(8))
        .await
        .unwrap();

    assert_eq!(result.termination_reason, TerminationReason::TargetReached);
    assert_eq!(result.iterations, 5);
    assert_eq!(result.run_history.len(), 5);
    assert_eq!(result.validation_runs, 0);
    assert_eq!(result.final_prompt.text, "prompt v5");
    assert!((result.final_metrics.success_rate - 100.0).abs() < 1e-9);

    let decisions: Vec<Decision> = result.decisions.iter().map(|d| d.decision).collect();
    assert_eq!(
        decisions,
        vec![
            Decision::QuickFix,
            Decision::QuickFix,
            Decision::FeedbackCycle,
            Decision::QuickFix,
            Decision::Validate,
            Decision::Accept,
        ]
    );
    assert_eq!(world.calls_for(Role::FeedbackCollector).len(), 1);
    assert_eq!(world.calls_for(Role::PromptEvolver).len(), 1);
    assert_eq!(
        result.run_history[3].candidate.origin,
        CandidateOrigin::Evolved
    );
}

#[tokio::test]
async fn test_target_with_validation_adds_validation_runs() {
    let world = versioned_world(8, |version, _| if version == 5 { 8 } else { 5 });
    let result = engine(&config(10, Some(3)), &world)
        .run(start(), &cases(8))
        .await
        .unwrap();

    assert_eq!(result.termination_reason, TerminationReason::TargetReached);
    assert_eq!(result.iterations, 5);
    assert_eq!(result.run_history.len(), 8);
    assert_eq!(result.validation_runs, 3);
    assert_eq!(result.iteration_runs().count(), 5);
    assert_eq!(result.final_prompt.text, "prompt v5");

    let passes: Vec<RunKind> = result.run_history[5..].iter().map(|run| run.kind).collect();
    assert_eq!(
        passes,
        vec![
            RunKind::Validation { pass: 1 },
            RunKind::Validation { pass: 2 },
            RunKind::Validation { pass: 3 },
        ]
    );
    assert!(result.run_history[5..].iter().all(|run| run.iteration == 5));
}

#[tokio::test]
async fn test_budget_exhaustion_selects_best_run_not_last() {
    let world = versioned_world(8, |version, _| match version {
        4 => 7,
        7 => 6,
        _ => 5,
    });
    let result = engine(&config(10, None), &world)
        .run(start(), &cases(8))
        .await
        .unwrap();

    assert!(!result.termination_reason.is_success());
    assert_eq!(result.iterations, 10);
    assert_eq!(result.run_history.len(), 10);
    assert_eq!(result.final_prompt.text, "prompt v4");
    assert!((result.final_metrics.success_rate - 87.5).abs() < 1e-9);
    assert_eq!(result.decision_at(10), Some(Decision::BudgetExhausted));
}

#[tokio::test]
async fn test_validation_failure_continues_optimizing() {
    // v2 scores 100, 100, 100 and then 60 on its third validation pass
    let world = versioned_world(5, |version, round| match (version, round) {
        (1, _) => 3,
        (2, 3) => 3,
        _ => 5,
    });
    let result = engine(&config(10, Some(3)), &world)
        .run(start(), &cases(5))
        .await
        .unwrap();

    let failing: &EvaluationRun = result
        .run_history
        .iter()
        .find(|run| {
            run.candidate.text == "prompt v2" && run.kind == RunKind::Validation { pass: 3 }
        })
        .unwrap();
    assert!((failing.metrics.success_rate - 60.0).abs() < 1e-9);

    assert!(result.decisions.contains(&IterationDecision {
        iteration: 2,
        decision: Decision::ValidationFailed,
    }));
    let fixes = world.calls_for(Role::PromptOptimizer);
    assert_eq!(fixes.len(), 2);
    assert!(fixes[1].prompt.contains("Current prompt:\nprompt v2"));

    assert_eq!(result.termination_reason, TerminationReason::TargetReached);
    assert_eq!(result.final_prompt.text, "prompt v3");
    assert_eq!(result.iterations, 3);
    assert_eq!(result.validation_runs, 6);
    assert_eq!(result.run_history.len(), 9);
}

#[tokio::test]
async fn test_generated_initial_prompt_uses_first_case() {
    let world = versioned_world(3, |_, _| 3);
    let result = engine(&config(5, None), &world)
        .run(
            InitialPrompt::Generate {
                use_case: "Echo the output label".to_string(),
            },
            &cases(3),
        )
        .await
        .unwrap();

    let drafts = world.calls_for(Role::InitialPromptGenerator);
    assert_eq!(drafts.len(), 1);
    assert!(drafts[0].prompt.contains("Echo the output label"));
    assert!(drafts[0].prompt.contains("in0"));
    assert_eq!(result.run_history[0].candidate.text, "prompt v2");
    assert_eq!(
        result.run_history[0].candidate.origin,
        CandidateOrigin::Initial
    );
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn test_observer_sees_every_run() {
    let world = versioned_world(4, |version, _| if version == 2 { 4 } else { 2 });
    let seen = Arc::new(AtomicUsize::new(0));
    let observer: RunObserver = {
        let seen = seen.clone();
        Arc::new(move |_: &EvaluationRun| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };

    let result = engine(&config(5, Some(2)), &world)
        .with_observer(observer)
        .run(start(), &cases(4))
        .await
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), result.run_history.len());
    assert_eq!(result.run_history.len(), 4);
}

#[tokio::test]
async fn test_empty_dataset_is_rejected() {
    let world = versioned_world(1, |_, _| 1);
    let err = engine(&config(5, None), &world)
        .run(start(), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, OptimizerError::DatasetEmpty));
    assert!(world.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_config_fails_before_provider_calls() {
    let world = versioned_world(1, |_, _| 1);
    let mut invalid = config(5, None);
    invalid.optimization.max_iterations = 0;

    let err = OptimizationEngine::from_config(
        &invalid,
        Arc::new(world.clone()),
        PromptTemplates::default(),
    )
    .err()
    .unwrap();

    assert!(matches!(err, ConfigError::InvalidMaxIterations(0)));
    assert!(world.calls().is_empty());
}

#[tokio::test]
async fn test_fatal_provider_error_aborts_run() {
    let world = ScriptedProvider::new(|call| match call.role {
        Role::AnswerGenerator => Err(ProviderError::fatal("invalid API key")),
        _ => Ok("prompt".to_string()),
    });

    let err = engine(&config(5, None), &world)
        .run(start(), &cases(3))
        .await
        .unwrap_err();

    match err {
        OptimizerError::ProviderFatal { stage, message } => {
            assert_eq!(stage, "evaluation");
            assert!(message.contains("invalid API key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_covers_mutation_and_evaluation_calls() {
    let world = versioned_world(2, |_, _| 1);
    let mut limited = config(2, None);
    limited.performance.api_rate_limit = 4;
    let clock = tokio::time::Instant::now();

    let result = engine(&limited, &world)
        .run(start(), &cases(2))
        .await
        .unwrap();

    // two answers, one quick fix, two answers: the fifth call waits a window
    assert_eq!(world.calls().len(), 5);
    assert_eq!(result.iterations, 2);
    assert!(clock.elapsed() >= Duration::from_secs(60));
}
