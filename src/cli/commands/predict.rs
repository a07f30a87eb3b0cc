//! `predict` command: apply a golden prompt to unlabeled inputs.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::dataset::load_inputs;
use crate::adapters::providers::ProviderRouter;
use crate::adapters::storage::{load_prompt, write_predictions, GoldenPromptStore};
use crate::cli::output::{create_spinner, list_table, output, truncate, CommandOutput};
use crate::domain::models::{Config, Role};
use crate::services::{Prediction, Predictor};

/// Apply a golden prompt to unlabeled inputs
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Unlabeled inputs (.yaml, .yml or .json); defaults to data.actual_data_file
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Prompt file; defaults to the latest golden prompt in data.output_dir
    #[arg(short, long)]
    pub prompt_file: Option<PathBuf>,

    /// Where to write predictions (.json or .yaml); defaults to data.predicted_data_file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Summary of a prediction run.
#[derive(Debug, Serialize)]
pub struct PredictOutput {
    /// Prompt file used
    pub prompt_file: PathBuf,
    /// Where predictions were written
    pub output_file: PathBuf,
    /// Inputs predicted
    pub total: usize,
    /// Inputs recorded as `ERROR`
    pub failed: usize,
    /// Every prediction in input order
    pub predictions: Vec<Prediction>,
}

impl CommandOutput for PredictOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "input", "answer"]);
        for (i, prediction) in self.predictions.iter().enumerate() {
            table.add_row(vec![
                (i + 1).to_string(),
                truncate(&prediction.input, 50),
                truncate(&prediction.answer, 40),
            ]);
        }

        let mut lines = vec![
            format!(
                "Predicted {} input(s) with {}",
                self.total,
                self.prompt_file.display()
            ),
            table.to_string(),
        ];
        if self.failed > 0 {
            lines.push(format!(
                "{} input(s) failed and were recorded as ERROR",
                self.failed
            ));
        }
        lines.push(format!("Saved to: {}", self.output_file.display()));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Predict every input with the latest or given golden prompt.
pub async fn execute(args: PredictArgs, config: &Config, json_mode: bool) -> Result<()> {
    let (prompt_file, prompt) = match args.prompt_file {
        Some(path) => {
            let prompt = load_prompt(&path)
                .with_context(|| format!("Failed to read prompt {}", path.display()))?;
            (path, prompt)
        }
        None => GoldenPromptStore::new(&config.data.output_dir)
            .load_latest()
            .context("Run `golden-prompt optimize` first or pass --prompt-file")?,
    };

    let input_file = args
        .input
        .unwrap_or_else(|| config.data.actual_data_file.clone());
    let inputs = load_inputs(&input_file)
        .with_context(|| format!("Failed to load inputs {}", input_file.display()))?;

    let router = ProviderRouter::from_config(&config.providers)
        .context("Failed to initialize completion providers")?;
    let predictor = Predictor::new(
        Arc::new(router),
        config.models.binding(Role::AnswerGenerator),
        &config.performance,
    );

    let spinner =
        (!json_mode).then(|| create_spinner(format!("Predicting {} input(s)", inputs.len())));
    let predictions = predictor.predict(&prompt, &inputs).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let predictions = predictions.context("Prediction failed")?;

    let output_file = args
        .output
        .unwrap_or_else(|| config.data.predicted_data_file.clone());
    write_predictions(&output_file, &predictions)
        .with_context(|| format!("Failed to write {}", output_file.display()))?;

    let failed = predictions.iter().filter(|p| p.is_error()).count();
    output(
        &PredictOutput {
            prompt_file,
            output_file,
            total: predictions.len(),
            failed,
            predictions,
        },
        json_mode,
    );
    Ok(())
}
