//! Sync engine configuration
//!
//! Loaded from `sync.json` in the msgsync config directory when present.
//! Every field has a default, so a partial file (or none at all) is valid.
//! Durations are range-checked on load, so a bad file fails there rather
//! than in the middle of a sync.

use anyhow::{Context, Result, ensure};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config filename in the msgsync config directory
const CONFIG_FILE: &str = "sync.json";

const MAX_HISTORY_AGE_DAYS: i64 = 365;
const MAX_LOOKBACK_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// History cursors older than this are not trusted
    pub history_max_age_days: i64,
    /// Watermark for a channel's first timestamp sync
    pub default_lookback_hours: i64,
    /// Sync channels on a worker pool instead of one after another
    pub parallel_channels: bool,
    /// SQLite file name inside the config directory
    pub database_file: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_max_age_days: 7,
            default_lookback_hours: 24,
            parallel_channels: false,
            database_file: "msgsync.sqlite".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load `sync.json` from the config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        let config: Self = config::load_json_or_default(CONFIG_FILE)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = config::load_json_file(path)?;
        config
            .validate()
            .with_context(|| format!("Invalid sync config: {}", path.display()))?;
        Ok(config)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse sync config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Write to `sync.json` in the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(CONFIG_FILE, self)
    }

    /// Write to a specific JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        config::save_json_file(path, self)
    }

    /// Check every field is usable
    pub fn validate(&self) -> Result<()> {
        self.history_max_age()?;
        self.default_lookback()?;
        ensure!(
            !self.database_file.trim().is_empty(),
            "database_file must not be empty"
        );
        Ok(())
    }

    /// Path of the SQLite database inside the config directory
    pub fn database_path(&self) -> Option<PathBuf> {
        config::config_path(&self.database_file)
    }

    pub fn history_max_age(&self) -> Result<Duration> {
        let days = self.history_max_age_days;
        ensure!(
            (1..=MAX_HISTORY_AGE_DAYS).contains(&days),
            "history_max_age_days must be between 1 and {MAX_HISTORY_AGE_DAYS}, got {days}"
        );
        Duration::try_days(days).context("history_max_age_days out of range")
    }

    pub fn default_lookback(&self) -> Result<Duration> {
        let hours = self.default_lookback_hours;
        ensure!(
            (1..=MAX_LOOKBACK_HOURS).contains(&hours),
            "default_lookback_hours must be between 1 and {MAX_LOOKBACK_HOURS}, got {hours}"
        );
        Duration::try_hours(hours).context("default_lookback_hours out of range")
    }
}
