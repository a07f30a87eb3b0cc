//! `config` command: print the effective configuration.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

/// The effective configuration.
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    /// Loaded and validated configuration
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

/// Print the effective configuration.
pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    output(
        &ConfigOutput {
            config: config.clone(),
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_is_yaml() {
        let out = ConfigOutput {
            config: Config::default(),
        };
        let human = out.to_human();
        assert!(human.contains("optimization:"));
        assert!(human.contains("max_iterations: 15"));
        assert_eq!(
            out.to_json()["confidence_validation"]["required_consecutive_passes"],
            3
        );
    }
}
