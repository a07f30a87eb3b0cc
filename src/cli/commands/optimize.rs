//! `optimize` command: run the optimization loop and save the golden prompt.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::dataset::load_test_cases;
use crate::adapters::providers::ProviderRouter;
use crate::adapters::storage::{load_prompt, GoldenPromptStore, PromptMetadata, SavedArtifacts};
use crate::cli::output::{create_spinner, list_table, output, truncate, CommandOutput};
use crate::domain::models::{Config, EvaluationRun, OptimizationResult, RunKind, TerminationReason};
use crate::services::{InitialPrompt, OptimizationEngine, PromptTemplates, RunObserver};

/// Search for a prompt that reproduces the labeled dataset
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Labeled test cases (.yaml, .yml or .json); defaults to data.dataset_file
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Use case description used to draft the first prompt; defaults to project.use_case
    #[arg(short, long)]
    pub use_case: Option<String>,

    /// Start from the prompt in this file instead of drafting one
    #[arg(short, long)]
    pub initial_prompt: Option<PathBuf>,

    /// Directory for golden prompt artifacts; defaults to data.output_dir
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Override optimization.max_iterations
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

/// One row of the run-history table.
#[derive(Debug, Serialize)]
pub struct RunRow {
    /// Iteration of the run
    pub iteration: u32,
    /// "optimization" or "validation #n"
    pub kind: String,
    /// How the candidate was produced
    pub origin: String,
    /// Success rate in percent
    pub success_rate: f64,
    /// Consistency score
    pub consistency: f64,
    /// Robustness score
    pub robustness: f64,
    /// Overall quality score
    pub overall_quality: f64,
    /// Matched over total cases
    pub matched: String,
}

impl From<&EvaluationRun> for RunRow {
    fn from(run: &EvaluationRun) -> Self {
        let kind = match run.kind {
            RunKind::Optimization => "optimization".to_string(),
            RunKind::Validation { pass } => format!("validation #{pass}"),
        };
        Self {
            iteration: run.iteration,
            kind,
            origin: run.candidate.origin.as_str().to_string(),
            success_rate: run.metrics.success_rate,
            consistency: run.metrics.consistency_score,
            robustness: run.metrics.robustness_score,
            overall_quality: run.metrics.overall_quality,
            matched: format!("{}/{}", run.metrics.matched_cases, run.metrics.total_cases),
        }
    }
}

/// Summary of an optimization run.
#[derive(Debug, Serialize)]
pub struct OptimizeOutput {
    /// Golden prompt text
    pub final_prompt: String,
    /// Why the loop stopped
    pub termination: TerminationReason,
    /// Iterations used
    pub iterations: u32,
    /// Validation passes run
    pub validation_runs: usize,
    /// Success rate of the selected run
    pub success_rate: f64,
    /// Quality of the selected run
    pub overall_quality: f64,
    /// Saved prompt file
    pub prompt_file: PathBuf,
    /// Saved JSON report
    pub report_file: PathBuf,
    /// Every evaluation run
    pub history: Vec<RunRow>,
}

impl OptimizeOutput {
    /// Summarize `result` and where it was saved.
    pub fn new(result: &OptimizationResult, saved: &SavedArtifacts) -> Self {
        Self {
            final_prompt: result.final_prompt.text.clone(),
            termination: result.termination_reason,
            iterations: result.iterations,
            validation_runs: result.validation_runs,
            success_rate: result.final_metrics.success_rate,
            overall_quality: result.final_metrics.overall_quality,
            prompt_file: saved.prompt_file.clone(),
            report_file: saved.report_file.clone(),
            history: result.run_history.iter().map(RunRow::from).collect(),
        }
    }
}

fn describe(reason: TerminationReason) -> &'static str {
    match reason {
        TerminationReason::TargetReached => "target reached",
        TerminationReason::IterationBudgetExhausted {
            quality_threshold_met: true,
        } => "iteration budget exhausted, quality threshold met",
        TerminationReason::IterationBudgetExhausted {
            quality_threshold_met: false,
        } => "iteration budget exhausted, quality threshold NOT met",
    }
}

impl CommandOutput for OptimizeOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&[
            "iter", "run", "origin", "success", "consistency", "robustness", "quality", "matched",
        ]);
        for row in &self.history {
            table.add_row(vec![
                row.iteration.to_string(),
                row.kind.clone(),
                row.origin.clone(),
                format!("{:.1}%", row.success_rate),
                format!("{:.1}", row.consistency),
                format!("{:.1}", row.robustness),
                format!("{:.1}", row.overall_quality),
                row.matched.clone(),
            ]);
        }

        let lines = [
            format!("Optimization finished: {}", describe(self.termination)),
            format!(
                "Iterations: {}  Validation runs: {}",
                self.iterations, self.validation_runs
            ),
            format!(
                "Success rate: {:.1}%  Quality: {:.1}/100",
                self.success_rate, self.overall_quality
            ),
            String::new(),
            table.to_string(),
            String::new(),
            format!("Golden prompt: {}", truncate(&self.final_prompt, 100)),
            format!("Saved to: {}", self.prompt_file.display()),
            format!("Report: {}", self.report_file.display()),
        ];
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Run the optimizer on a dataset and save the golden prompt.
pub async fn execute(args: OptimizeArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut config = config.clone();
    if let Some(max_iterations) = args.max_iterations {
        config.optimization.max_iterations = max_iterations;
    }

    let dataset = args
        .dataset
        .unwrap_or_else(|| config.data.dataset_file.clone());
    let cases = load_test_cases(&dataset)
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;

    let use_case = args.use_case.or_else(|| config.project.use_case.clone());
    let initial = match (&args.initial_prompt, &use_case) {
        (Some(path), _) => InitialPrompt::Supplied(
            load_prompt(path)
                .with_context(|| format!("Failed to read initial prompt {}", path.display()))?,
        ),
        (None, Some(use_case)) => InitialPrompt::Generate {
            use_case: use_case.clone(),
        },
        (None, None) => {
            anyhow::bail!("Provide --use-case, --initial-prompt or project.use_case in the config")
        }
    };

    let templates = PromptTemplates::load_optional(config.prompts_file.as_deref())?;
    let router = ProviderRouter::from_config(&config.providers)
        .context("Failed to initialize completion providers")?;

    let spinner = (!json_mode).then(|| create_spinner("Evaluating initial prompt"));
    let observer: RunObserver = {
        let spinner = spinner.clone();
        Arc::new(move |run: &EvaluationRun| {
            if let Some(ref spinner) = spinner {
                spinner.set_message(format!(
                    "Iteration {} ({}): success {:.1}%, quality {:.1}",
                    run.iteration,
                    RunRow::from(run).kind,
                    run.metrics.success_rate,
                    run.metrics.overall_quality
                ));
            }
        })
    };

    let engine = OptimizationEngine::from_config(&config, Arc::new(router), templates)?
        .with_observer(observer);
    let result = engine.run(initial, &cases).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let result = result.context("Optimization failed")?;

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.data.output_dir.clone());
    let store = GoldenPromptStore::new(output_dir);
    let metadata = PromptMetadata {
        use_case: use_case.as_deref().unwrap_or("(supplied prompt)"),
        test_cases: cases.len(),
        generated_at: Local::now(),
    };
    let saved = store
        .save(&result, &metadata)
        .context("Failed to save golden prompt")?;

    output(&OptimizeOutput::new(&result, &saved), json_mode);
    Ok(())
}
