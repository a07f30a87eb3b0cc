//! Dataset loading from YAML or JSON record lists.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::models::TestCase;

/// Errors raised while reading a dataset file.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The file could not be read.
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        /// Dataset file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or JSON of the expected shape.
    #[error("Failed to parse dataset {path}: {message}")]
    Parse {
        /// Dataset file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The extension is not `.yaml`, `.yml` or `.json`.
    #[error("Unsupported dataset format for {0}: expected .yaml, .yml or .json")]
    UnsupportedFormat(PathBuf),

    /// No record survived loading.
    #[error("Dataset {0} contains no usable records")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Result<Self, DatasetError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(DatasetError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// A bare list or a list under a `test_cases` / `records` key.
#[derive(Deserialize)]
#[serde(untagged)]
enum Document<T> {
    List(Vec<T>),
    Cases { test_cases: Vec<T> },
    Records { records: Vec<T> },
}

impl<T> Document<T> {
    fn into_records(self) -> Vec<T> {
        match self {
            Self::List(records) | Self::Records { records } => records,
            Self::Cases { test_cases } => test_cases,
        }
    }
}

/// An unlabeled record: a bare string or an object with an input field.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputRecord {
    Text(String),
    Record {
        #[serde(alias = "input_data")]
        input: String,
    },
}

fn parse<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DatasetError> {
    let format = Format::of(path)?;
    let body = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document: Document<T> = match format {
        Format::Yaml => serde_yaml::from_str(&body).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(&body).map_err(|e| e.to_string()),
    }
    .map_err(|message| DatasetError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    Ok(document.into_records())
}

/// Load labeled test cases, dropping rows with a blank input or expected output.
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>, DatasetError> {
    let records: Vec<TestCase> = parse(path)?;
    let total = records.len();
    let cases: Vec<TestCase> = records.into_iter().filter(TestCase::is_complete).collect();

    if cases.len() < total {
        warn!(
            path = %path.display(),
            dropped = total - cases.len(),
            "dropped incomplete test cases"
        );
    }
    if cases.is_empty() {
        return Err(DatasetError::Empty(path.to_path_buf()));
    }

    debug!(path = %path.display(), cases = cases.len(), "loaded test cases");
    Ok(cases)
}

/// Load unlabeled inputs, dropping blank ones.
pub fn load_inputs(path: &Path) -> Result<Vec<String>, DatasetError> {
    let records: Vec<InputRecord> = parse(path)?;
    let inputs: Vec<String> = records
        .into_iter()
        .map(|record| match record {
            InputRecord::Text(input) | InputRecord::Record { input } => input.trim().to_string(),
        })
        .filter(|input| !input.is_empty())
        .collect();

    if inputs.is_empty() {
        return Err(DatasetError::Empty(path.to_path_buf()));
    }

    debug!(path = %path.display(), inputs = inputs.len(), "loaded inputs");
    Ok(inputs)
}
