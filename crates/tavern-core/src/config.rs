//! Tavern configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TavernError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TavernConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
}

impl TavernConfig {
    /// Load config from the default path (~/.tavern/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TavernError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TavernError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Tavern home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tavern")
    }
}

/// Campaign orchestrator timing and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Seconds between watchdog ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// First retry delay after a failed execution. 0 retries on every tick.
    #[serde(default)]
    pub retry_backoff_base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub retry_backoff_max_secs: u64,
    /// Consecutive failures before an alert is raised for a campaign.
    #[serde(default = "default_alert_after")]
    pub alert_after_failures: u32,
}

fn default_tick_interval() -> u64 { 10 }
fn default_backoff_max() -> u64 { 600 }
fn default_alert_after() -> u32 { 10 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            retry_backoff_base_secs: 0,
            retry_backoff_max_secs: default_backoff_max(),
            alert_after_failures: default_alert_after(),
        }
    }
}

/// Workflow store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Keep everything in memory (nothing survives a restart).
    #[serde(default)]
    pub in_memory: bool,
}

fn default_store_path() -> String { "~/.tavern/tavern.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path(), in_memory: false }
    }
}

/// Discord REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String { "https://discord.com/api/v10".into() }
fn default_timeout() -> u64 { 15 }

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Which modules to enable at start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default = "default_enabled_modules")]
    pub enabled: Vec<String>,
    /// Modules kept disabled even if they are enabled by default.
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_enabled_modules() -> Vec<String> { vec!["contest".into()] }

impl Default for ModulesConfig {
    fn default() -> Self {
        Self { enabled: default_enabled_modules(), disabled: Vec::new() }
    }
}
