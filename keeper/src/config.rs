//! Keeper configuration

use anyhow::{Context, Result};
use ballast_core::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine state snapshot, JSON
    pub snapshot_path: String,

    /// File holding the current collateral price as a decimal string
    pub price_path: String,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Maximum liquidations per batch
    pub max_liquidations_per_batch: usize,

    /// Run one tick and exit
    pub single_pass: bool,

    /// Account credited with liquidation compensation
    pub liquidator: AccountId,
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());

        let config_str = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config file: {}", config_path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        Ok(config)
    }

    pub fn default_local() -> Self {
        Self {
            snapshot_path: "~/.ballast/state.json".to_string(),
            price_path: "~/.ballast/price".to_string(),
            poll_interval_secs: 10,
            max_liquidations_per_batch: 10,
            single_pass: false,
            liquidator: AccountId(0),
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_local();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = shellexpand::full(path).context(format!("Failed to expand path {}", path))?;
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_local();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.max_liquidations_per_batch, 10);
        assert!(!config.single_pass);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let text = r#"
            snapshot_path = "/var/lib/ballast/state.json"
            price_path = "/var/lib/ballast/price"
            poll_interval_secs = 3
            max_liquidations_per_batch = 4
            single_pass = true
            liquidator = 42
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.liquidator, AccountId(42));
        assert!(config.single_pass);

        let written = toml::to_string_pretty(&config).unwrap();
        let reread: Config = toml::from_str(&written).unwrap();
        assert_eq!(reread.snapshot_path, config.snapshot_path);
    }

    #[test]
    fn test_expand_plain_path_unchanged() {
        assert_eq!(expand_path("/tmp/state.json").unwrap(), "/tmp/state.json");
    }
}
