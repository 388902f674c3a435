// Configuration management for the Shallot CLI
//
// Cross-platform config stored in:
// - macOS: ~/.config/shallot/config.json
// - Linux: ~/.config/shallot/config.json
// - Windows: %APPDATA%\shallot\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shallot_core::NetConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory service address (host:port)
    pub directory_addr: String,

    /// Relay chain length for outbound messages
    pub hops: usize,

    /// Prime size in bits for generated keypairs
    pub prime_bits: u64,

    /// Timeout in seconds for connects, reads, and directory exchanges
    pub io_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let net = NetConfig::default();
        Self {
            directory_addr: "127.0.0.1:9000".to_string(),
            hops: net.hops,
            prime_bits: net.prime_bits,
            io_timeout_secs: net.io_timeout_secs,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("shallot");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            let contents =
                std::fs::read_to_string(&config_file).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let config_file = Self::config_file()?;
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_file, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Network settings for core components
    pub fn net(&self) -> NetConfig {
        NetConfig {
            hops: self.hops,
            prime_bits: self.prime_bits,
            io_timeout_secs: self.io_timeout_secs,
        }
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "directory_addr" => {
                self.directory_addr = value.to_string();
            }
            "hops" => {
                self.hops = value.parse().context("Invalid hop count")?;
            }
            "prime_bits" => {
                self.prime_bits = value.parse().context("Invalid prime size")?;
            }
            "io_timeout_secs" => {
                self.io_timeout_secs = value.parse().context("Invalid timeout")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.save()?;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "directory_addr" => Some(self.directory_addr.clone()),
            "hops" => Some(self.hops.to_string()),
            "prime_bits" => Some(self.prime_bits.to_string()),
            "io_timeout_secs" => Some(self.io_timeout_secs.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("directory_addr".to_string(), self.directory_addr.clone()),
            ("hops".to_string(), self.hops.to_string()),
            ("prime_bits".to_string(), self.prime_bits.to_string()),
            (
                "io_timeout_secs".to_string(),
                format!("{}s", self.io_timeout_secs),
            ),
        ]
    }
}
