//! Golden prompt persistence.
//!
//! Each optimization writes a timestamped prompt file with a `#` metadata
//! header, refreshes `golden_prompt.txt`, and stores the full result as a
//! JSON report next to them.

use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::models::OptimizationResult;
use crate::services::predictor::Prediction;

const PREFIX: &str = "golden_prompt_";
const LATEST_FILE: &str = "golden_prompt.txt";

/// Errors raised by the golden prompt store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A report or prediction file could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The file holds only header lines.
    #[error("Prompt file {0} contains no prompt text")]
    EmptyPrompt(PathBuf),

    /// The directory holds no golden prompt.
    #[error("No golden prompt found in {0}")]
    NotFound(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Files written by one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifacts {
    /// Timestamped prompt file
    pub prompt_file: PathBuf,
    /// `golden_prompt.txt`, overwritten on every save
    pub latest_file: PathBuf,
    /// JSON report of the full result
    pub report_file: PathBuf,
}

/// Metadata written into the prompt header.
#[derive(Debug, Clone)]
pub struct PromptMetadata<'a> {
    /// Use case the prompt was optimized for
    pub use_case: &'a str,
    /// Number of labeled cases
    pub test_cases: usize,
    /// Save time
    pub generated_at: DateTime<Local>,
}

/// Directory-backed store of golden prompts.
#[derive(Debug, Clone)]
pub struct GoldenPromptStore {
    dir: PathBuf,
}

impl GoldenPromptStore {
    /// Store rooted at `dir`; created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write prompt, latest copy and JSON report.
    pub fn save(
        &self,
        result: &OptimizationResult,
        metadata: &PromptMetadata<'_>,
    ) -> Result<SavedArtifacts, StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let stamp = metadata.generated_at.format("%Y%m%d_%H%M%S");
        let prompt_file = self.dir.join(format!("{PREFIX}{stamp}.txt"));
        let latest_file = self.dir.join(LATEST_FILE);
        let report_file = self.dir.join(format!("{PREFIX}{stamp}.json"));

        let body = render_prompt_file(result, metadata);
        fs::write(&prompt_file, &body).map_err(io_error(&prompt_file))?;
        fs::write(&latest_file, &body).map_err(io_error(&latest_file))?;

        let report = serde_json::to_string_pretty(result)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&report_file, report).map_err(io_error(&report_file))?;

        info!(
            prompt = %prompt_file.display(),
            report = %report_file.display(),
            "golden prompt saved"
        );

        Ok(SavedArtifacts {
            prompt_file,
            latest_file,
            report_file,
        })
    }

    /// Most recent timestamped prompt, else `golden_prompt.txt`.
    pub fn latest(&self) -> Result<Option<PathBuf>, StoreError> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let mut newest: Option<PathBuf> = None;
        for entry in fs::read_dir(&self.dir).map_err(io_error(&self.dir))? {
            let path = entry.map_err(io_error(&self.dir))?.path();
            let is_prompt = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(PREFIX) && name.ends_with(".txt"));
            // Timestamped names sort chronologically
            if is_prompt && newest.as_ref().is_none_or(|current| path > *current) {
                newest = Some(path);
            }
        }

        if newest.is_none() {
            let fallback = self.dir.join(LATEST_FILE);
            if fallback.is_file() {
                newest = Some(fallback);
            }
        }

        debug!(latest = ?newest, "looked up latest golden prompt");
        Ok(newest)
    }

    /// Load the latest prompt text.
    pub fn load_latest(&self) -> Result<(PathBuf, String), StoreError> {
        let path = self
            .latest()?
            .ok_or_else(|| StoreError::NotFound(self.dir.clone()))?;
        let prompt = load_prompt(&path)?;
        Ok((path, prompt))
    }
}

fn render_prompt_file(result: &OptimizationResult, metadata: &PromptMetadata<'_>) -> String {
    let use_case = metadata.use_case.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::new();
    let _ = writeln!(out, "# Golden Prompt");
    let _ = writeln!(
        out,
        "# Generated: {}",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "# Use Case: {use_case}");
    let _ = writeln!(out, "# Test Cases: {}", metadata.test_cases);
    let _ = writeln!(
        out,
        "# Success Rate: {:.1}%",
        result.final_metrics.success_rate
    );
    let _ = writeln!(
        out,
        "# Quality Score: {:.1}/100",
        result.final_metrics.overall_quality
    );
    out.push('\n');
    out.push_str(result.final_prompt.text.trim());
    out.push('\n');
    out
}

/// Read a prompt file, skipping leading `#` header lines and blank lines.
pub fn load_prompt(path: &Path) -> Result<String, StoreError> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    let prompt = content
        .lines()
        .skip_while(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    if prompt.is_empty() {
        return Err(StoreError::EmptyPrompt(path.to_path_buf()));
    }
    Ok(prompt)
}

/// Write predictions as JSON, or YAML for `.yaml`/`.yml` paths.
pub fn write_predictions(path: &Path, predictions: &[Prediction]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let body = if is_yaml {
        serde_yaml::to_string(predictions)
            .map_err(|e| StoreError::Serialization(e.to_string()))?
    } else {
        serde_json::to_string_pretty(predictions)
            .map_err(|e| StoreError::Serialization(e.to_string()))?
    };

    fs::write(path, body).map_err(io_error(path))
}
