use crate::domain::failure::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "WORKOUT_SYNC_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Retry policy for transient remote failures.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Optional JSONL journal of coordinator activity.
    #[serde(default)]
    pub journal: JournalConfig,
}

/// Settings for the HTTP remote adapter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Global timeout per request. Default: 15
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Picks the explicit path, then `WORKOUT_SYNC_CONFIG`, then the
    /// per-user default file if it exists; otherwise built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::load(Path::new(&path));
            }
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        if self.remote.timeout_secs == 0 {
            anyhow::bail!("remote.timeout_secs must be greater than zero");
        }
        if self.remote.base_url.trim().is_empty() {
            anyhow::bail!("remote.base_url must not be empty");
        }

        Ok(())
    }
}

/// `~/.workout-sync/config.yaml`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".workout-sync").join("config.yaml"))
}

#[cfg(test)]
#[path = "tests/sync_config_tests.rs"]
mod tests;
