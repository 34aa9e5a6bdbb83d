//! Port layout of pipeline lines
//!
//! Line `n` owns the data ports `base_port + n * port_stride ..` and the
//! control port `control_port + n * port_stride`:
//!
//! ```text
//!  offset 0..3   producer → processors  (page, revision, logitem)
//!  offset 3..6   processors → sink      (page, revision, logitem)
//! ```

use crate::config::NetworkConfig;
use crate::types::RecordKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data ports used by one line
pub const DATA_CHANNELS_PER_LINE: u16 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Endpoints of a single line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEndpoints {
    pub line: usize,
    host: String,
    data_base: u16,
    control: u16,
}

impl LineEndpoints {
    pub fn for_line(network: &NetworkConfig, line: usize) -> Self {
        let offset = line as u32 * network.port_stride as u32;
        Self {
            line,
            host: network.host.clone(),
            data_base: clamp_port(network.base_port as u32 + offset),
            control: clamp_port(network.control_port as u32 + offset),
        }
    }

    /// Producer → processor channel for `kind`
    pub fn records(&self, kind: RecordKind) -> Endpoint {
        self.data(kind.channel_index())
    }

    /// Processor → sink channel for `kind`
    pub fn rows(&self, kind: RecordKind) -> Endpoint {
        self.data(3 + kind.channel_index())
    }

    /// Stop broadcast from the producer
    pub fn control(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.control)
    }

    fn data(&self, offset: u16) -> Endpoint {
        Endpoint::new(self.host.clone(), self.data_base.saturating_add(offset))
    }
}

// Port ranges are checked when the configuration is validated
fn clamp_port(port: u32) -> u16 {
    port.min(u16::MAX as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> NetworkConfig {
        NetworkConfig {
            base_port: 10000,
            control_port: 11000,
            port_stride: 20,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_line_zero_layout() {
        let line = LineEndpoints::for_line(&network(), 0);
        assert_eq!(line.records(RecordKind::Page).port, 10000);
        assert_eq!(line.records(RecordKind::Revision).port, 10001);
        assert_eq!(line.records(RecordKind::LogItem).port, 10002);
        assert_eq!(line.rows(RecordKind::Page).port, 10003);
        assert_eq!(line.rows(RecordKind::LogItem).port, 10005);
        assert_eq!(line.control().port, 11000);
    }

    #[test]
    fn test_lines_are_disjoint() {
        let a = LineEndpoints::for_line(&network(), 1);
        let b = LineEndpoints::for_line(&network(), 2);
        assert_eq!(a.records(RecordKind::Page).port, 10020);
        assert_eq!(b.records(RecordKind::Page).port, 10040);
        assert_eq!(a.control().port, 11020);
        assert!(a.rows(RecordKind::LogItem).port < b.records(RecordKind::Page).port);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("127.0.0.1", 9000).to_string(), "127.0.0.1:9000");
    }
}
