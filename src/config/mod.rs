pub mod adaptor_config;
pub mod scan_config;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, ensure};
use log::{LevelFilter, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::adaptor_config::AdaptorConfig;
use crate::config::scan_config::ScanConfig;
use crate::utils::ensure_directory_exists;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub adaptor: AdaptorConfig,
    pub scan: ScanConfig,
    /// One of off, error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            adaptor: AdaptorConfig::default(),
            scan: ScanConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Loads the config from a configuration file, falling back to defaults when it is missing.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)
            .with_context(|| format!("Invalid config file {}", file_path_str))?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize relay config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Relay config saved to {:?}", file_path_str);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.adaptor.id.is_empty(), "adaptor.id must not be empty");
        self.scan.validate()?;
        self.log_level_filter()?;
        Ok(())
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| anyhow!("Unknown log level {:?}", self.log_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load_config(&dir.path().join("relay.json")).await.unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.scan.poll_interval_ms, 500);
        assert_eq!(config.scan.scan_window_ms, 2000);
        assert_eq!(config.scan.retry_delay_secs, 10);
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.json");

        let mut config = RelayConfig::default();
        config.adaptor.id = "adt42".to_string();
        config.scan.min_rssi = Some(-90);
        config.save_config(&path).await.unwrap();

        assert_eq!(RelayConfig::load_config(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(&path, r#"{"scan": {"retry_delay_secs": 3}}"#).await.unwrap();

        let config = RelayConfig::load_config(&path).await.unwrap();
        assert_eq!(config.scan.retry_delay_secs, 3);
        assert_eq!(config.scan.poll_interval_ms, 500);
        assert_eq!(config.adaptor, AdaptorConfig::default());
    }

    #[test]
    fn validate_rejects_zero_timings_and_bad_levels() {
        let mut config = RelayConfig::default();
        assert!(config.validate().is_ok());

        config.scan.scan_window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
