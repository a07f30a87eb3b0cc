//! Layered configuration loading with figment.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;

use crate::domain::models::config::Config;

/// Project directory holding `config.yaml` and `local.yaml`
pub const PROJECT_DIR: &str = ".golden-prompt";

/// Prefix of environment overrides, nested keys split on `__`
pub const ENV_PREFIX: &str = "GOLDEN_PROMPT_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .golden-prompt/config.yaml
    /// 3. .golden-prompt/local.yaml (optional overrides)
    /// 4. Environment variables (GOLDEN_PROMPT_* prefix)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`load`](Self::load) with project files resolved under `root`.
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let project = root.join(PROJECT_DIR);
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project.join("config.yaml")))
            .merge(Yaml::file(project.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(&figment).context("Failed to extract configuration from figment")
    }

    /// Load configuration from an explicit file, replacing the project files.
    ///
    /// Environment variables still apply on top.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(&figment)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    /// Pick the explicit file when given, else the project hierarchy.
    pub fn resolve(explicit: Option<&Path>) -> Result<Config> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    fn extract(figment: &Figment) -> Result<Config> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}
