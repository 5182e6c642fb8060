//! Askdaemon configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main askdaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendezvous server tuning
    pub server: ServerConfig,

    /// Defaults for the ask command
    pub ask: AskConfig,

    /// Operator notification configuration
    pub notify: NotifyConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_pending == 0 {
            return Err(eyre::eyre!("server.max-pending must be at least 1"));
        }
        if self.ask.timeout_secs == 0 {
            return Err(eyre::eyre!("ask.timeout-secs must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .askdaemon.yml
        let local_config = PathBuf::from(".askdaemon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/askdaemon/askdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("askdaemon").join("askdaemon.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Rendezvous server tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the server binds on 127.0.0.1
    pub port: u16,

    /// Maximum number of unanswered requests held at once
    #[serde(rename = "max-pending")]
    pub max_pending: usize,

    /// How long answered requests are kept before eviction, in seconds
    #[serde(rename = "answered-ttl-secs")]
    pub answered_ttl_secs: u64,

    /// How long the store must stay empty before the server exits, in seconds
    #[serde(rename = "idle-timeout-secs")]
    pub idle_timeout_secs: u64,

    /// Watchdog sweep interval in seconds
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,

    /// Interval between answer re-checks while a caller waits, in milliseconds
    #[serde(rename = "answer-poll-ms")]
    pub answer_poll_ms: u64,

    /// Upper bound on a single long-poll wait, in seconds
    #[serde(rename = "max-wait-secs")]
    pub max_wait_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9131,
            max_pending: 100,
            answered_ttl_secs: 300,
            idle_timeout_secs: 600,
            sweep_interval_secs: 30,
            answer_poll_ms: 500,
            max_wait_secs: 25,
        }
    }
}

impl ServerConfig {
    /// Retention window for answered requests
    pub fn answered_ttl(&self) -> Duration {
        Duration::from_secs(self.answered_ttl_secs)
    }

    /// Sustained-empty window that triggers shutdown
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Interval between watchdog sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Interval between answer re-checks
    pub fn answer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.answer_poll_ms)
    }

    /// Longest wait honored for a single long-poll request
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Defaults for the ask command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AskConfig {
    /// Total time to wait for an answer, in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Length of each server-side wait slice, in seconds
    #[serde(rename = "wait-slice-secs")]
    pub wait_slice_secs: u64,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            wait_slice_secs: 20,
        }
    }
}

impl AskConfig {
    /// Total time to wait for an answer
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Length of each server-side wait slice
    pub fn wait_slice(&self) -> Duration {
        Duration::from_secs(self.wait_slice_secs)
    }
}

/// Operator notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Delivery channel: "desktop", "stderr" or "none"
    pub channel: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: "desktop".to_string(),
        }
    }
}
