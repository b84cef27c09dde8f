//! modelprobe configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::PriorityRule;

/// Main modelprobe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persisted scheduler state file
    #[serde(rename = "state-file")]
    pub state_file: PathBuf,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Probe request settings
    pub probe: ProbeConfig,

    /// Batch selection settings
    pub scheduler: SchedulerConfig,

    /// Catalog source settings
    pub catalog: CatalogConfig,

    /// Credential source settings
    pub credential: CredentialConfig,

    /// Ordered priority rules; replaces the built-in table when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priorities: Option<Vec<PriorityRule>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(crate::DEFAULT_STATE_FILE),
            log_level: None,
            probe: ProbeConfig::default(),
            scheduler: SchedulerConfig::default(),
            catalog: CatalogConfig::default(),
            credential: CredentialConfig::default(),
            priorities: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local .modelprobe.yml, then ~/.config/modelprobe/modelprobe.yml
        for path in Self::implicit_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only `log-level`, following the same lookup as [`Config::load`]
    ///
    /// Runs before logging is initialized, so failures are silent here and
    /// reported by the full load afterwards.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::implicit_paths(),
        };
        paths
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| {
                let content = fs::read_to_string(path).ok()?;
                let config: Self = serde_yaml::from_str(&content).ok()?;
                Some(config.log_level)
            })
            .flatten()
    }

    fn implicit_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".modelprobe.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("modelprobe").join("modelprobe.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Probe request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Chat-completions endpoint probed for every target
    #[serde(rename = "inference-url")]
    pub inference_url: String,

    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Response-size cap sent with every probe
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Fixed test prompt
    pub prompt: String,

    /// Pause between sequential probes in milliseconds
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Identifier substrings selecting `max_completion_tokens` and no `temperature`
    #[serde(rename = "completion-token-markers")]
    pub completion_token_markers: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            inference_url: "https://models.github.ai/inference/chat/completions".to_string(),
            timeout_ms: 30_000,
            max_tokens: 10,
            prompt: "What is 2+2? Answer with just the number.".to_string(),
            delay_ms: 1_000,
            completion_token_markers: vec!["/o1".to_string(), "/gpt-5".to_string()],
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Batch selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Targets probed per `poll` unless --batch-size is given
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Targets listed by `next` unless --limit is given
    #[serde(rename = "next-preview")]
    pub next_preview: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            next_preview: 10,
        }
    }
}

/// Catalog source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog listing endpoint
    pub url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "https://models.github.ai/catalog/models".to_string(),
        }
    }
}

/// Credential source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Environment variable checked before running the command
    #[serde(rename = "token-env")]
    pub token_env: Option<String>,

    /// Command whose stdout is the bearer token
    pub command: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_env: Some("GITHUB_TOKEN".to_string()),
            command: "gh auth token".to_string(),
        }
    }
}
