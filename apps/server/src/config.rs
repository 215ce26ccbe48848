//! Application configuration.

use pricealert_alerts::EngineConfig;
use pricealert_feeds::BinanceRestSource;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scheduler settings.
    pub engine: EngineConfig,
    /// Control API listen port.
    pub port: u16,
    pub database_url: String,
    pub binance_url: String,
    /// Use the Binance REST API instead of the simulator.
    pub live: bool,
    /// Start the alert checker on boot.
    pub autostart: bool,
    /// Logging level.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            port: 8080,
            database_url: "sqlite://alerts.db".to_string(),
            binance_url: BinanceRestSource::BASE_URL.to_string(),
            live: false,
            autostart: false,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
