//! Server and logging settings.

use serde::{Deserialize, Serialize};

/// Network and connection-pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port. `0` picks a free port.
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub max_send_queue: usize,
    /// How often the relay-drain loop polls the relayer, in milliseconds.
    pub relay_interval_ms: u64,
    /// WebSocket ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            relay_interval_ms: 100,
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// Logging output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` wins when set.
    pub level: String,
    /// JSON lines when true, human-readable otherwise.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}
