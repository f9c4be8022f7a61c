//! Configuration loading and management.
//!
//! - [`types`]: top-level `Config`, broker, dispatch and heartbeat sections
//! - [`connections`]: IRC connection blocks
//! - [`defaults`]: serde default functions

mod connections;
mod defaults;
mod types;

pub use connections::{ChannelJoin, ConnectionConfig};
pub use types::{BrokerConfig, Config, ConfigError, DispatchConfig, HeartbeatConfig};
