//! Configuration management for mediadeck
//!
//! Handles config file loading/saving and resolution of defaults.
//! Config is stored at ~/.config/mediadeck/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::prober::DEFAULT_PROBE_TIMEOUT;
use crate::store::FileStore;

/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "MEDIADECK_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// JSON store holding servers and tokens
    pub store_path: Option<PathBuf>,
    /// Connection probe timeout in milliseconds
    pub probe_timeout_ms: Option<u64>,
    /// Default tracing filter, e.g. "mediadeck=debug"
    pub log_filter: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/mediadeck/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mediadeck").join("config.toml"))
    }

    /// Load config from the default path, or defaults if not found
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from `path`, or defaults if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().context("Could not determine config path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Store file location: configured path, else the platform data dir
    pub fn store_path(&self) -> Result<PathBuf> {
        self.store_path
            .clone()
            .or_else(FileStore::default_path)
            .context("Could not determine data directory for the server store")
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    /// Log filter with fallback chain:
    /// 1. Environment variable MEDIADECK_LOG
    /// 2. Filter from config file
    /// 3. "warn"
    pub fn log_filter(&self) -> String {
        std::env::var(LOG_ENV)
            .ok()
            .or_else(|| self.log_filter.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}
