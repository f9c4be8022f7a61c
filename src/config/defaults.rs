//! Default value functions for configuration.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Broker Defaults
// =============================================================================

pub fn default_services_channel() -> String {
    "tenyks.services.broadcast_to".to_string()
}

pub fn default_robot_channel() -> String {
    "tenyks.robot.broadcast_to".to_string()
}

// =============================================================================
// Dispatch Defaults
// =============================================================================

pub fn default_max_workers() -> usize {
    64
}

pub fn default_outbound_capacity() -> usize {
    128
}

pub fn default_heartbeat_interval() -> u64 {
    60
}

// =============================================================================
// Connection Defaults
// =============================================================================

pub fn default_irc_port() -> u16 {
    6667
}

pub fn default_nick() -> String {
    "tenyks".to_string()
}

pub fn default_realname() -> String {
    "tenyks IRC bot".to_string()
}
