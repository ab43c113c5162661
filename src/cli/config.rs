// ABOUTME: Configuration management for the conductor CLI
// ABOUTME: Loads YAML settings from standard locations and applies environment overrides

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::engine::{EngineConfig, RetryDelay};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Run variables applied beneath the plan's own variables
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p),
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            _ => Config::default(),
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Working directory candidates first, then the home directory
    fn find_config_file() -> Option<PathBuf> {
        let local = [
            "conductor.yaml",
            "conductor.yml",
            ".conductor.yaml",
            ".conductor.yml",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists());

        local.or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".conductor").join("config.yaml"))
                .filter(|path| path.exists())
        })
    }

    fn merge_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("CONDUCTOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CONDUCTOR_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(timeout) = lookup("CONDUCTOR_DEFAULT_TIMEOUT") {
            self.engine.default_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("invalid CONDUCTOR_DEFAULT_TIMEOUT '{}'", timeout))?;
        }
        if let Some(delay) = lookup("CONDUCTOR_RETRY_DELAY") {
            let delay = humantime::parse_duration(&delay)
                .with_context(|| format!("invalid CONDUCTOR_RETRY_DELAY '{}'", delay))?;
            self.engine.retry_delay = RetryDelay::fixed(delay);
        }
        if let Some(cancel) = lookup("CONDUCTOR_CANCEL_ON_TIMEOUT") {
            self.engine.cancel_on_timeout = cancel
                .parse()
                .with_context(|| format!("invalid CONDUCTOR_CANCEL_ON_TIMEOUT '{}'", cancel))?;
        }

        Ok(())
    }
}
