//! Configuration loading

use anyhow::Result;
use galil_core::settings::DEFAULT_AXES;
use galil_source::DEFAULT_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Controller line length (39 on constrained boards)
    #[serde(default = "default_line_length")]
    pub line_length: usize,
    /// Report lint warnings as well as errors
    #[serde(default)]
    pub warnings: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            line_length: default_line_length(),
            warnings: false,
        }
    }
}

fn default_line_length() -> usize {
    DEFAULT_LINE_LENGTH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Axes probed by axis-mask parameters
    #[serde(default = "default_axes")]
    pub axes: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            axes: default_axes(),
        }
    }
}

fn default_axes() -> String {
    DEFAULT_AXES.to_string()
}

/// Load configuration from file, with defaults when it does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
