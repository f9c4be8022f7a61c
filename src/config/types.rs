//! Core configuration types and loading.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::connections::ConnectionConfig;
use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Broker channel names.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Handler worker pool.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Service heartbeat.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// IRC connections, keyed by the name envelopes use to address them.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Broker channel names.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Channel the bot publishes to; services subscribe here.
    #[serde(default = "default_services_channel")]
    pub services_channel: String,
    /// Channel services publish to; the bot subscribes here.
    #[serde(default = "default_robot_channel")]
    pub robot_channel: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            services_channel: default_services_channel(),
            robot_channel: default_robot_channel(),
        }
    }
}

/// Handler worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum handlers running at once (default: 64).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-handler time limit in seconds. Unset means no limit.
    #[serde(default)]
    pub handler_timeout_secs: Option<u64>,
    /// Outbound line queue per IRC connection (default: 128).
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl DispatchConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            handler_timeout_secs: None,
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

/// Service heartbeat configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between PINGs (default: 60).
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_heartbeat_interval(),
        }
    }
}
