//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/hub_stream.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `HUB_STREAM_`, using `__` between
//!    nesting levels
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use hub_stream::config::HubStreamConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // HUB_STREAM_BRIDGE__POLL_INTERVAL_MS=250 overrides [bridge] poll_interval_ms
//! let config = HubStreamConfig::load()?;
//! config.validate()?;
//! println!("Polling every {:?}", config.bridge.poll_interval());
//! # Ok(())
//! # }
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::hardware::mock::MAX_RING_SIZE;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/hub_stream.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "HUB_STREAM_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubStreamConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Polling bridge settings
    pub bridge: BridgeSettings,
    /// Simulated gateway used by the demo
    pub mock_hub: MockHubConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "hub_stream".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Delay between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Initial byte queue capacity
    pub initial_capacity: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            initial_capacity: crate::data::DEFAULT_CAPACITY,
        }
    }
}

impl BridgeSettings {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Simulated gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockHubConfig {
    /// Ring buffer size in bytes (1-256)
    pub ring_size: usize,
    /// Latency added to every simulated call, in milliseconds
    pub latency_ms: u64,
}

impl Default for MockHubConfig {
    fn default() -> Self {
        Self {
            ring_size: crate::hardware::mock::DEFAULT_RING_SIZE,
            latency_ms: 0,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl HubStreamConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> BridgeResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path plus environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BridgeResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_FORMATS.contains(&format.as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_FORMATS.join(", ")
            )));
        }

        if self.bridge.poll_interval_ms == 0 {
            return Err(BridgeError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.bridge.initial_capacity == 0 {
            return Err(BridgeError::Configuration(
                "initial_capacity must be greater than 0".to_string(),
            ));
        }

        if !(1..=MAX_RING_SIZE).contains(&self.mock_hub.ring_size) {
            return Err(BridgeError::Configuration(format!(
                "Invalid ring_size {}. Must be 1-{}",
                self.mock_hub.ring_size, MAX_RING_SIZE
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = HubStreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.bridge.initial_capacity, 1024);
        assert_eq!(config.mock_hub.ring_size, 100);
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hub.toml",
                r#"
                    [application]
                    log_level = "debug"

                    [bridge]
                    poll_interval_ms = 500
                "#,
            )?;
            jail.set_env("HUB_STREAM_BRIDGE__INITIAL_CAPACITY", "64");

            let config = HubStreamConfig::load_from("hub.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.application.log_format, "pretty");
            assert_eq!(config.bridge.poll_interval_ms, 500);
            assert_eq!(config.bridge.initial_capacity, 64);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("hub.toml", "[bridge]\npoll_interval_ms = 500\n")?;
            jail.set_env("HUB_STREAM_BRIDGE__POLL_INTERVAL_MS", "250");

            let config = HubStreamConfig::load_from("hub.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.bridge.poll_interval_ms, 250);
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config =
                HubStreamConfig::load_from("does-not-exist.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, HubStreamConfig::default());
            Ok(())
        });
    }

    #[test]
    fn wrong_type_is_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("hub.toml", "[bridge]\npoll_interval_ms = \"soon\"\n")?;
            let result = HubStreamConfig::load_from("hub.toml");
            assert!(matches!(result, Err(BridgeError::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = HubStreamConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = HubStreamConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = HubStreamConfig::default();
        config.bridge.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = HubStreamConfig::default();
        config.bridge.initial_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = HubStreamConfig::default();
        config.mock_hub.ring_size = 300;
        assert!(matches!(
            config.validate(),
            Err(BridgeError::Configuration(msg)) if msg.contains("ring_size")
        ));
    }
}
