//! Configuration loading and management for the sync core
//!
//! A single serde-backed [`SyncConfig`] with sensible defaults, persisted as
//! JSON in the platform config directory. Tunables here are operator-level
//! constants; none of them are configurable per request.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

/// Application name used for the config directory
const APP_DIR: &str = "catalog-sync";
/// Config file name inside the app directory
const CONFIG_FILE: &str = "config.json";

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output (daily-rolled under `logs/`)
    pub file_output: bool,

    /// File name prefix for rolled log files
    pub file_name_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            file_name_prefix: "catalog-sync".to_string(),
        }
    }
}

/// Complete sync-core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum concurrently reconciled records per run
    pub concurrency: usize,

    /// Capacity of the caller-facing event channel
    pub event_buffer: usize,

    /// Cooldown between full-catalog run starts, in seconds
    pub cooldown_secs: u64,

    /// Where run history is persisted; `None` uses the default location
    pub history_path: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            event_buffer: 256,
            cooldown_secs: 15 * 60,
            history_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Cooldown window as a [`Duration`]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Loads and persists [`SyncConfig`] as JSON
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager rooted at the platform config directory
    pub fn new() -> Result<Self> {
        let base = dirs::config_dir().context("could not resolve platform config directory")?;
        Ok(Self {
            config_path: base.join(APP_DIR).join(CONFIG_FILE),
        })
    }

    /// Manager rooted at an explicit path (tests, containers)
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load the config, creating it with defaults on first run
    pub async fn load(&self) -> Result<SyncConfig> {
        if !self.config_path.exists() {
            info!(
                "No config file found at {}, creating defaults",
                self.config_path.display()
            );
            let config = SyncConfig::default();
            self.save(&config).await?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("failed to read {}", self.config_path.display()))?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", self.config_path.display()))?;
        Ok(config)
    }

    /// Persist the config as pretty-printed JSON
    pub async fn save(&self, config: &SyncConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.config_path, raw)
            .await
            .with_context(|| format!("failed to write {}", self.config_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.cooldown(), Duration::from_secs(900));
        assert!(config.history_path.is_none());
    }

    #[tokio::test]
    async fn load_creates_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.concurrency, 5);
        assert!(manager.config_path().exists());

        let mut changed = loaded.clone();
        changed.concurrency = 8;
        changed.cooldown_secs = 60;
        manager.save(&changed).await.unwrap();

        let reloaded = manager.load().await.unwrap();
        assert_eq!(reloaded.concurrency, 8);
        assert_eq!(reloaded.cooldown_secs, 60);
    }
}
