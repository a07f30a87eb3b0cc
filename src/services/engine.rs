//! The optimization loop.
//!
//! An explicit state machine drives evaluation, decision, mutation and
//! validation. The run history is append-only; the best prompt is never
//! tracked as mutable state but selected from the history at termination.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{ConfigError, OptimizerError, OptimizerResult};
use crate::domain::models::{
    CandidateOrigin, Config, Decision, EvaluationRun, IterationDecision, OptimizationConfig,
    OptimizationResult, PromptCandidate, QualityMetrics, Role, RunKind, TerminationReason, TestCase,
};
use crate::domain::ports::{CompletionProvider, Sleeper};
use crate::services::evaluator::ConcurrentEvaluator;
use crate::services::feedback::FeedbackSynthesizer;
use crate::services::mutator::PromptMutator;
use crate::services::prompts::PromptTemplates;
use crate::services::retry::RetryPolicy;
use crate::services::scorer::QualityScorer;
use crate::services::validator::ConfidenceValidator;

/// Where the first candidate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialPrompt {
    /// Use this text as iteration 1.
    Supplied(String),
    /// Draft a prompt from the use case and the first test case.
    Generate {
        /// What the prompt should accomplish
        use_case: String,
    },
}

/// Called after every evaluation run, validation passes included.
pub type RunObserver = Arc<dyn Fn(&EvaluationRun) + Send + Sync>;

/// Engine states. Run references are indices into the history.
#[derive(Debug)]
enum EngineState {
    Init,
    Evaluating(PromptCandidate),
    Deciding(usize),
    Validating(usize),
    QuickFixing(usize),
    FeedbackCycle(usize),
    Terminated {
        reason: TerminationReason,
        selected: usize,
    },
}

/// Coordinates evaluator, mutator, feedback synthesizer and validator.
pub struct OptimizationEngine {
    config: OptimizationConfig,
    evaluator: ConcurrentEvaluator,
    mutator: PromptMutator,
    feedback: FeedbackSynthesizer,
    validator: ConfidenceValidator,
    observer: Option<RunObserver>,
}

impl OptimizationEngine {
    /// Assemble an engine from prebuilt components.
    pub fn new(
        config: OptimizationConfig,
        evaluator: ConcurrentEvaluator,
        mutator: PromptMutator,
        feedback: FeedbackSynthesizer,
        validator: ConfidenceValidator,
    ) -> Self {
        Self {
            config,
            evaluator,
            mutator,
            feedback,
            validator,
            observer: None,
        }
    }

    /// Wire every component from configuration.
    ///
    /// Fails fast on invalid configuration, before any provider call.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn CompletionProvider>,
        templates: PromptTemplates,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let retry = RetryPolicy::from_config(&config.performance);
        let evaluator = ConcurrentEvaluator::new(
            provider.clone(),
            config.models.binding(Role::AnswerGenerator),
            config.performance.clone(),
            QualityScorer::new(config.matching.clone(), config.scoring.clone()),
        )
        .with_answer_template(templates.answer_generator.clone());
        // one budget for every provider call of the run
        let limiter = evaluator.rate_limiter().clone();
        let feedback = FeedbackSynthesizer::new(
            provider.clone(),
            config.models.binding(Role::FeedbackCollector),
            templates.feedback_collector.clone(),
            retry,
            config.scoring.edge_case_max_words,
        )
        .with_rate_limiter(limiter.clone());
        let mutator = PromptMutator::new(provider, config.models.clone(), templates, retry)
            .with_rate_limiter(limiter);
        let validator = ConfidenceValidator::from_config(
            &config.confidence_validation,
            config.optimization.target_success_rate,
        );

        Ok(Self::new(
            config.optimization.clone(),
            evaluator,
            mutator,
            feedback,
            validator,
        ))
    }

    /// Replace the backoff timer of every component.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.evaluator = self.evaluator.with_sleeper(sleeper.clone());
        self.mutator = self.mutator.with_sleeper(sleeper.clone());
        self.feedback = self.feedback.with_sleeper(sleeper);
        self
    }

    /// Call `observer` after every evaluation run.
    pub fn with_observer(mut self, observer: RunObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run the loop to termination.
    #[instrument(
        skip_all,
        fields(cases = cases.len(), max_iterations = self.config.max_iterations)
    )]
    pub async fn run(
        &self,
        initial: InitialPrompt,
        cases: &[TestCase],
    ) -> OptimizerResult<OptimizationResult> {
        if cases.is_empty() {
            return Err(OptimizerError::DatasetEmpty);
        }

        let mut history: Vec<EvaluationRun> = Vec::new();
        let mut decisions: Vec<IterationDecision> = Vec::new();
        let mut initial = Some(initial);
        let mut state = EngineState::Init;

        loop {
            debug!(state = ?state, "engine step");
            state = match state {
                EngineState::Init => {
                    let initial = initial.take().ok_or_else(|| {
                        ConfigError::ValidationFailed("engine initialized twice".to_string())
                    })?;
                    EngineState::Evaluating(self.initial_candidate(initial, cases).await?)
                }

                EngineState::Evaluating(candidate) => {
                    let run = {
                        let repeats = runs_of(&history, &candidate);
                        self.evaluator
                            .evaluate(&candidate, cases, RunKind::Optimization, &repeats)
                            .await?
                    };
                    info!(
                        iteration = run.iteration,
                        origin = %run.candidate.origin,
                        success_rate = run.metrics.success_rate,
                        overall_quality = run.metrics.overall_quality,
                        "iteration evaluated"
                    );
                    self.notify(&run);
                    history.push(run);
                    EngineState::Deciding(history.len() - 1)
                }

                EngineState::Deciding(index) => {
                    let run = &history[index];
                    let decision = decide(&run.metrics, run.iteration, &self.config);
                    decisions.push(IterationDecision {
                        iteration: run.iteration,
                        decision,
                    });
                    self.transition(decision, index, &history)
                }

                EngineState::Validating(index) => {
                    let candidate = history[index].candidate.clone();
                    let iteration = history[index].iteration;
                    let outcome = {
                        let prior = runs_of(&history, &candidate);
                        self.validator
                            .validate(&self.evaluator, &candidate, cases, &prior)
                            .await?
                    };
                    let passed = outcome.passed();
                    for run in outcome.runs {
                        self.notify(&run);
                        history.push(run);
                    }

                    if passed {
                        decisions.push(IterationDecision {
                            iteration,
                            decision: Decision::Accept,
                        });
                        EngineState::Terminated {
                            reason: TerminationReason::TargetReached,
                            selected: index,
                        }
                    } else {
                        decisions.push(IterationDecision {
                            iteration,
                            decision: Decision::ValidationFailed,
                        });
                        let failing = history.len() - 1;
                        let decision = next_step(iteration, &self.config);
                        decisions.push(IterationDecision {
                            iteration,
                            decision,
                        });
                        self.transition(decision, failing, &history)
                    }
                }

                EngineState::QuickFixing(index) => {
                    let run = &history[index];
                    let next = match run.representative_failure() {
                        Some(failing) => self.mutator.quick_fix(&run.candidate, failing).await?,
                        None => {
                            warn!(iteration = run.iteration, "no failing case to fix");
                            run.candidate
                                .successor(run.candidate.text.clone(), CandidateOrigin::QuickFix)
                        }
                    };
                    EngineState::Evaluating(next)
                }

                EngineState::FeedbackCycle(index) => {
                    let run = &history[index];
                    let window = feedback_window(
                        &history[..=index],
                        run.iteration,
                        self.config.feedback_frequency,
                    );
                    let summary = self.feedback.synthesize(&run.candidate, &window).await?;
                    let next = self.mutator.evolve(&run.candidate, &summary).await?;
                    EngineState::Evaluating(next)
                }

                EngineState::Terminated { reason, selected } => {
                    return Ok(self.finish(history, decisions, reason, selected));
                }
            };
        }
    }

    async fn initial_candidate(
        &self,
        initial: InitialPrompt,
        cases: &[TestCase],
    ) -> OptimizerResult<PromptCandidate> {
        match initial {
            InitialPrompt::Supplied(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ConfigError::ValidationFailed(
                        "initial prompt is empty".to_string(),
                    )
                    .into());
                }
                Ok(PromptCandidate::initial(text))
            }
            InitialPrompt::Generate { use_case } => {
                self.mutator.initial(&use_case, &cases[0]).await
            }
        }
    }

    /// Map a decision to the next state; budget exhaustion selects the best run.
    fn transition(
        &self,
        decision: Decision,
        index: usize,
        history: &[EvaluationRun],
    ) -> EngineState {
        match decision {
            Decision::Validate => EngineState::Validating(index),
            Decision::QuickFix => EngineState::QuickFixing(index),
            Decision::FeedbackCycle => EngineState::FeedbackCycle(index),
            Decision::BudgetExhausted | Decision::ValidationFailed | Decision::Accept => {
                let selected = select_best(history).unwrap_or(index);
                let best_quality = history[selected].metrics.overall_quality;
                EngineState::Terminated {
                    reason: TerminationReason::IterationBudgetExhausted {
                        quality_threshold_met: best_quality >= self.config.min_quality_threshold,
                    },
                    selected,
                }
            }
        }
    }

    fn notify(&self, run: &EvaluationRun) {
        if let Some(observer) = &self.observer {
            observer(run);
        }
    }

    fn finish(
        &self,
        history: Vec<EvaluationRun>,
        decisions: Vec<IterationDecision>,
        reason: TerminationReason,
        selected: usize,
    ) -> OptimizationResult {
        let final_run = &history[selected];
        let iterations = history.iter().map(|run| run.iteration).max().unwrap_or(1);
        let validation_runs = history.iter().filter(|run| run.is_validation()).count();

        info!(
            iterations,
            validation_runs,
            selected_iteration = final_run.iteration,
            success_rate = final_run.metrics.success_rate,
            overall_quality = final_run.metrics.overall_quality,
            reason = ?reason,
            "optimization finished"
        );

        OptimizationResult {
            final_prompt: final_run.candidate.clone(),
            final_metrics: final_run.metrics,
            termination_reason: reason,
            iterations,
            validation_runs,
            decisions,
            run_history: history,
        }
    }
}

/// Decision after an optimization run.
pub fn decide(metrics: &QualityMetrics, iteration: u32, config: &OptimizationConfig) -> Decision {
    if metrics.meets(config.target_success_rate) {
        Decision::Validate
    } else {
        next_step(iteration, config)
    }
}

/// Budget check, then feedback cadence.
pub fn next_step(iteration: u32, config: &OptimizationConfig) -> Decision {
    if iteration >= config.max_iterations {
        Decision::BudgetExhausted
    } else if config.feedback_frequency > 0 && iteration % config.feedback_frequency == 0 {
        Decision::FeedbackCycle
    } else {
        Decision::QuickFix
    }
}

/// Index of the run with the highest overall quality; the earliest wins ties.
pub fn select_best(history: &[EvaluationRun]) -> Option<usize> {
    history
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, run)| {
            let quality = run.metrics.overall_quality;
            match best {
                Some((_, best_quality)) if quality <= best_quality => best,
                _ => Some((index, quality)),
            }
        })
        .map(|(index, _)| index)
}

/// Earlier runs of the same prompt text.
fn runs_of<'a>(
    history: &'a [EvaluationRun],
    candidate: &PromptCandidate,
) -> Vec<&'a EvaluationRun> {
    history
        .iter()
        .filter(|run| run.candidate.text == candidate.text)
        .collect()
}

/// Runs of the last `frequency` iterations ending at `iteration`.
fn feedback_window(
    history: &[EvaluationRun],
    iteration: u32,
    frequency: u32,
) -> Vec<&EvaluationRun> {
    let first = iteration.saturating_sub(frequency.max(1)) + 1;
    history
        .iter()
        .filter(|run| run.iteration >= first && run.iteration <= iteration)
        .collect()
}
