//! Configuration loading
//!
//! Settings come from a YAML file in the platform config directory (or an explicit
//! path). Every field has a default, so a missing file is not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::target::DEFAULT_FILE_PATTERN;

/// Environment variable overriding the trust store location
pub const STORE_DIR_ENV: &str = "MODEL_SENTINEL_HOME";

/// Default Hugging Face hub endpoint
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Trust store root. Falls back to `$MODEL_SENTINEL_HOME`, then the platform data dir.
    pub store_dir: Option<PathBuf>,

    /// Glob selecting reviewed files
    pub file_pattern: String,

    /// Revision used when a hub target names none
    pub default_revision: String,

    /// Write an audit report for every completed run
    pub run_reports: bool,

    /// Command used to page file content in the console prompter (e.g. `less -R`)
    pub pager: Option<String>,

    pub hub: HubConfig,

    pub web: WebConfig,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            default_revision: "main".to_string(),
            run_reports: true,
            pager: None,
            hub: HubConfig::default(),
            web: WebConfig::default(),
        }
    }
}

/// Hub client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub endpoint: String,

    /// Environment variable holding an access token
    pub token_env: String,

    pub timeout_seconds: u64,

    /// Upper bound on simultaneous file downloads
    pub max_concurrent_downloads: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            token_env: "HF_TOKEN".to_string(),
            timeout_seconds: 30,
            max_concurrent_downloads: 4,
        }
    }
}

impl HubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Token from the configured environment variable, if set and non-empty
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

/// Web approval surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,

    /// How long to wait for the reviewer to submit
    pub decision_timeout_seconds: u64,

    /// How long the confirmation page stays up after submission
    pub grace_period_seconds: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            decision_timeout_seconds: 600,
            grace_period_seconds: 3,
        }
    }
}

impl WebConfig {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_seconds)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

impl SentinelConfig {
    /// Load from the default location, or defaults if no file exists
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a specific path, or defaults if the file does not exist
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: SentinelConfig = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `<config dir>/config.yaml`
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "model-sentinel", "model-sentinel")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| dirs::config_dir().map(|d| d.join("model-sentinel")))
            .map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Resolve the trust store root: config, then environment, then platform data dir
    pub fn resolve_store_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Ok(dir.clone());
        }

        if let Ok(dir) = std::env::var(STORE_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        directories::ProjectDirs::from("io", "model-sentinel", "model-sentinel")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .or_else(|| dirs::data_dir().map(|d| d.join("model-sentinel")))
            .context("Could not determine trust store directory")
    }
}
