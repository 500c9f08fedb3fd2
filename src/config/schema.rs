//! Configuration schema definitions.
//!
//! This module defines the static configuration of the proxy: entry points,
//! forwarding limits and observability. The dynamic routing graph lives in
//! [`crate::config::dynamic`] and is embedded under the `udp` key.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::dynamic::UdpConfiguration;

/// Root configuration for the UDP proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Named UDP entry points, one listening socket each.
    pub entry_points: BTreeMap<String, EntryPointConfig>,

    /// Flow forwarding limits shared by every entry point.
    pub forwarder: ForwarderConfig,

    /// Routing graph written by the file provider.
    pub udp: UdpConfiguration,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Names of all configured entry points, in sorted order.
    pub fn entry_point_names(&self) -> Vec<String> {
        self.entry_points.keys().cloned().collect()
    }
}

/// A single UDP entry point.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EntryPointConfig {
    /// Bind address (e.g., "0.0.0.0:8093", or ":8093" for every IPv4 interface;
    /// use "[::]:8093" for IPv6).
    pub address: String,

    /// A flow with no traffic for this long is closed.
    pub idle_timeout_ms: u64,
}

impl EntryPointConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8093".to_string(),
            idle_timeout_ms: 3_000,
        }
    }
}

/// Flow forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Backend dial timeout in milliseconds.
    pub dial_timeout_ms: u64,

    /// Maximum live flows per entry point.
    pub max_flows: usize,

    /// Datagrams buffered per flow before new ones are dropped.
    pub queue_depth: usize,

    /// Receive buffer size; larger datagrams are truncated.
    pub max_datagram_size: usize,

    /// Reaper period in milliseconds. Defaults to a quarter of the
    /// entry point's idle timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reap_interval_ms: Option<u64>,
}

impl ForwarderConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Reaper period for an entry point with the given idle timeout.
    pub fn reap_interval(&self, idle_timeout: Duration) -> Duration {
        match self.reap_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => (idle_timeout / 4).max(Duration::from_millis(10)),
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 2_000,
            max_flows: 10_000,
            queue_depth: 64,
            max_datagram_size: 65_535,
            reap_interval_ms: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
