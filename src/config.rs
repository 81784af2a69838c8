//! Configuration Module
//!
//! This module defines all configuration structures for the anchoring service.
//! Configuration is loaded from TOML files and parsed using serde.

use crate::batch::MIN_SAFETY_BUFFER;
use crate::error::{AnchorError, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Main configuration structure
///
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [batch]
/// safety_buffer = 2
/// generation_interval_ms = 60000
/// tick_interval_ms = 5000
/// max_pool_items = 1000
///
/// [anchoring]
/// blockchain = "ethereum"
/// network = "mock"
/// base_pub_key = "02ab..."
/// required_confirmations = 12
/// grace_period_ms = 3600000
///
/// [storage]
/// blob_dir = "data/micro-batches"
///
/// [database]
/// url = "sqlite://data/records.db"
///
/// [api]
/// host = "127.0.0.1"
/// port = 8545
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub batch: BatchConfig,
    pub anchoring: AnchoringConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
}

/// Micro-batching and sweep configuration
///
/// # Fields
/// - `safety_buffer`: Generations a sweep lags behind the newest micro-batches.
///   Treat it as a latency budget: a writer slower than this many
///   generations misses its sweep.
/// - `generation_interval_ms`: How often a new sealable batch is swept
/// - `tick_interval_ms`: How often the scheduled loop wakes up
/// - `max_pool_items`: Maximum resources committed per micro-batch
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub safety_buffer: u64,
    pub generation_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub max_pool_items: usize,
}

/// Blockchain anchoring configuration
///
/// # Fields
/// - `blockchain` / `network`: Which adapter to use (`"mock"` network runs in memory)
/// - `base_pub_key`: Hex public key our own seal addresses derive from
/// - `required_confirmations`: Confirmations before a seal counts as final
/// - `grace_period_ms`: How long a seal may stay unconfirmed before it is
///   resubmitted (ours) or abandoned (watched)
#[derive(Debug, Clone, Deserialize)]
pub struct AnchoringConfig {
    pub blockchain: String,
    pub network: String,
    pub base_pub_key: String,
    pub required_confirmations: u64,
    pub grace_period_ms: u64,
}

impl AnchoringConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Micro-batch blob storage
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub blob_dir: String,
}

/// Database configuration
///
/// # Fields
/// - `url`: sqlx SQLite URL for batch and seal records (e.g., "sqlite://data/records.db")
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// API server configuration
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on (e.g., 8545)
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded, parsed and validated
    /// * `Err` if the file couldn't be read, the TOML is invalid, or a value is out of range
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the subsystem cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch.safety_buffer < MIN_SAFETY_BUFFER {
            return Err(AnchorError::InvalidInput(format!(
                "batch.safety_buffer must be at least {}",
                MIN_SAFETY_BUFFER
            )));
        }
        if self.batch.generation_interval_ms == 0 {
            return Err(AnchorError::InvalidInput(
                "batch.generation_interval_ms must be positive".to_string(),
            ));
        }
        if self.batch.tick_interval_ms == 0 {
            return Err(AnchorError::InvalidInput(
                "batch.tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.batch.max_pool_items == 0 {
            return Err(AnchorError::InvalidInput(
                "batch.max_pool_items must be positive".to_string(),
            ));
        }
        if self.anchoring.required_confirmations == 0 {
            return Err(AnchorError::InvalidInput(
                "anchoring.required_confirmations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [batch]
        safety_buffer = 2
        generation_interval_ms = 60000
        tick_interval_ms = 5000
        max_pool_items = 1000

        [anchoring]
        blockchain = "ethereum"
        network = "mock"
        base_pub_key = "02abcdef"
        required_confirmations = 12
        grace_period_ms = 3600000

        [storage]
        blob_dir = "data/micro-batches"

        [database]
        url = "sqlite://data/records.db"

        [api]
        host = "127.0.0.1"
        port = 8545
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.batch.safety_buffer, 2);
        assert_eq!(config.anchoring.grace_period(), Duration::from_secs(3600));
        assert_eq!(config.api.port, 8545);
    }

    #[test]
    fn test_small_safety_buffer_rejected() {
        for buffer in ["0", "1"] {
            let text = SAMPLE.replace("safety_buffer = 2", &format!("safety_buffer = {}", buffer));
            assert!(Config::parse(&text).is_err());
        }
    }

    #[test]
    fn test_zero_intervals_rejected() {
        for (field, value) in [("generation_interval_ms", "60000"), ("tick_interval_ms", "5000")] {
            let text = SAMPLE.replace(
                &format!("{} = {}", field, value),
                &format!("{} = 0", field),
            );
            assert!(Config::parse(&text).is_err(), "{} = 0 accepted", field);
        }
    }

    #[test]
    fn test_zero_confirmations_rejected() {
        let text = SAMPLE.replace("required_confirmations = 12", "required_confirmations = 0");
        assert!(Config::parse(&text).is_err());
    }
}
