//! Configuration for the treasury ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Treasury reserve seeded at first open, in display DGT
    pub initial_supply: Decimal,

    /// Bounded wait for row locks, in milliseconds
    pub lock_wait_ms: i64,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/treasury"),
            service_name: "treasury-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            initial_supply: Decimal::from(1_000_000_000u64),
            lock_wait_ms: 1_000,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load defaults with environment variable overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("TREASURY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(supply) = std::env::var("TREASURY_INITIAL_SUPPLY") {
            config.initial_supply = supply
                .parse()
                .map_err(|e| crate::Error::Config(format!("invalid TREASURY_INITIAL_SUPPLY: {}", e)))?;
        }

        if let Ok(wait) = std::env::var("TREASURY_LOCK_WAIT_MS") {
            config.lock_wait_ms = wait
                .parse()
                .map_err(|e| crate::Error::Config(format!("invalid TREASURY_LOCK_WAIT_MS: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "treasury-core");
        assert_eq!(config.lock_wait_ms, 1_000);
        assert_eq!(config.initial_supply, Decimal::from(1_000_000_000u64));
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            data_dir = "/tmp/treasury"
            service_name = "treasury-core"
            service_version = "0.1.0"
            initial_supply = "500000"
            lock_wait_ms = 250

            [rocksdb]
            write_buffer_size_mb = 32
            max_write_buffer_number = 2
            target_file_size_mb = 32
            max_background_jobs = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.lock_wait_ms, 250);
        assert_eq!(config.initial_supply, Decimal::from(500_000u64));
        assert_eq!(config.rocksdb.write_buffer_size_mb, 32);
    }
}
