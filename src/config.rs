use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::DEFAULT_PORT;

/// Reconnect backoff settings for the connection supervisor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Retry interval floor, restored after every successful connect
    pub initial: Duration,
    /// Retry interval ceiling
    pub max: Duration,
    /// Multiplier applied after each failed attempt
    pub factor: f64,
    /// How often a halted connection re-checks whether it was resumed
    pub halt_poll: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
            factor: 1.5,
            halt_poll: Duration::from_secs(2),
        }
    }
}

/// Protocol engine timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTimings {
    /// Settle time between a power-on and the first refresh sweep
    pub poweron_delay: Duration,
    /// Pause between refresh sweeps while the device is still waking up
    pub poweron_interval: Duration,
    /// Window during which further forced power queries are suppressed
    pub force_refresh_cooldown: Duration,
    /// Gap between queries issued in bulk
    pub query_pacing: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            poweron_delay: Duration::from_secs(1),
            poweron_interval: Duration::from_secs(2),
            force_refresh_cooldown: Duration::from_secs(2),
            query_pacing: Duration::from_millis(10),
        }
    }
}

/// Everything needed to open and supervise a receiver connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Dial on creation and redial whenever the link drops
    pub auto_reconnect: bool,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub timings: EngineTimings,
}

impl ConnectionConfig {
    /// Default settings for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Use a port other than 14999
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Turn automatic reconnection on or off
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Replace the backoff policy
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Replace the engine timings
    pub fn with_timings(mut self, timings: EngineTimings) -> Self {
        self.timings = timings;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            timings: EngineTimings::default(),
        }
    }
}
