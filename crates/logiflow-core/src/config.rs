//! Logiflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LogiflowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogiflowConfig {
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LogiflowConfig {
    /// Load config from the default path (~/.logiflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LogiflowError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LogiflowError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LogiflowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Logiflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".logiflow")
    }
}

/// Workflow automation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Upper bound for a single action invocation (0 = unbounded).
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// SQLite database holding workflows, rules and execution logs.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_tick_interval_secs() -> u64 { 60 }
fn default_action_timeout_secs() -> u64 { 30 }
fn default_database_path() -> String { "~/.logiflow/automation.db".into() }

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            database_path: default_database_path(),
        }
    }
}

impl AutomationConfig {
    /// Database path with `~` and environment variables expanded.
    pub fn resolved_database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.database_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.database_path.clone()))
    }

    /// Per-action timeout, `None` when disabled.
    pub fn action_timeout(&self) -> Option<std::time::Duration> {
        (self.action_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.action_timeout_secs))
    }

    /// Tick interval, clamped to at least one second.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

/// Operational logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String { "info".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}
