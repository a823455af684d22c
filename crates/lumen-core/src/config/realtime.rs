//! Real-time delivery configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each connection's outbound FIFO queue. A connection
    /// whose queue is full is disconnected.
    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Maximum live connections per subject on one process; the oldest is
    /// evicted when exceeded.
    #[serde(default = "default_max_connections_per_subject")]
    pub max_connections_per_subject: usize,
    /// WebSocket ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Connections silent for longer than this are closed, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Interval at which the process renews its liveness lease, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Lifetime of the liveness lease and presence records, in seconds.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_seconds: u64,
    /// Time allowed to flush outbound queues on shutdown, in milliseconds.
    #[serde(default = "default_drain_grace")]
    pub drain_grace_ms: u64,
}

impl RealtimeConfig {
    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    /// Idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Lease TTL as a [`Duration`].
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_seconds)
    }

    /// Drain grace as a [`Duration`].
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_queue_capacity(),
            max_connections_per_subject: default_max_connections_per_subject(),
            ping_interval_seconds: default_ping_interval(),
            idle_timeout_seconds: default_idle_timeout(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            lease_ttl_seconds: default_lease_ttl(),
            drain_grace_ms: default_drain_grace(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_connections_per_subject() -> usize {
    5
}

fn default_ping_interval() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    90
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_lease_ttl() -> u64 {
    30
}

fn default_drain_grace() -> u64 {
    2000
}
