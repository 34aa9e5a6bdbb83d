//! Channel port configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network configuration for inter-stage channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Host every stage binds and connects on
    pub host: String,
    /// First data port of line 0
    pub base_port: u16,
    /// Control port of line 0
    pub control_port: u16,
    /// Distance between the port ranges of consecutive lines
    #[serde(default = "default_port_stride")]
    pub port_stride: u16,
    /// How long connectors retry before giving up
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How long binders wait for every peer, and pushers for acknowledgements
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

fn default_port_stride() -> u16 {
    20
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_ready_timeout_secs() -> u64 {
    60
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 10000,
            control_port: 11000,
            port_stride: default_port_stride(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}
