//! Configuration management for medley
//!
//! Handles config file loading/saving and account token management.
//! Config is stored at ~/.config/medley/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Account API token (per-server tokens come from the resource list)
    pub account_token: Option<String>,
    /// Override for the account API base URL
    pub account_url: Option<String>,
    /// Direct-tier probe timeout in seconds (default 10)
    pub direct_timeout_secs: Option<u64>,
    /// Relay-tier probe timeout in seconds (default 30)
    pub relay_timeout_secs: Option<u64>,
    /// Collection retention window in days (default 7)
    pub collection_retention_days: Option<u64>,
}

impl Config {
    /// Get config file path (~/.config/medley/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("medley").join("config.toml"))
    }

    /// Get data directory for local stores (~/.local/share/medley)
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("medley"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path =
            Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Get the account token with fallback chain:
    /// 1. Environment variable MEDLEY_TOKEN
    /// 2. Token from config file
    pub fn get_account_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var("MEDLEY_TOKEN") {
            if !token.is_empty() {
                return Some(token);
            }
        }
        self.account_token.clone()
    }
}

impl SecretStore for Config {
    fn get_secret(&self, key: &str) -> Option<String> {
        match key {
            "account_token" => self.get_account_token(),
            _ => None,
        }
    }

    fn set_secret(&mut self, key: &str, value: &str) {
        if key == "account_token" {
            self.account_token = Some(value.to_string());
            let _ = self.save(); // Best effort save
        }
    }
}

/// Minimal get/set secret surface
///
/// The platform's encrypted key/value store is an external collaborator;
/// the plain config file stands in for it here and anything implementing
/// this trait can be slotted in instead.
pub trait SecretStore {
    fn get_secret(&self, key: &str) -> Option<String>;
    fn set_secret(&mut self, key: &str, value: &str);
}
