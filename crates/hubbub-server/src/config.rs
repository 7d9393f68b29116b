use std::sync::Arc;
use std::time::Duration;

use hubbub_settings::ServerSettings;

use crate::codec;
use crate::hooks::{
    self, ConnectHook, Deserializer, DisconnectHook, ErrorHandler, IdGenerator, Serializer,
};

/// Shortest relay or heartbeat period a hub will run with.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Hooks and tunables for a hub. Fixed once the hub is built.
#[derive(Clone)]
pub struct HubConfig {
    pub serializer: Serializer,
    pub deserializer: Deserializer,
    pub error_handler: ErrorHandler,
    pub connect_hook: ConnectHook,
    pub disconnect_hook: DisconnectHook,
    pub id_generator: IdGenerator,
    /// Period of the relay-drain loop.
    pub relay_interval: Duration,
    /// Period between WebSocket pings on every connection.
    pub heartbeat_interval: Duration,
    /// Capacity of each connection's outbound queue.
    pub max_send_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            serializer: Arc::new(codec::display_serializer),
            deserializer: Arc::new(codec::passthrough_deserializer),
            error_handler: Arc::new(hooks::default_error_handler),
            connect_hook: Arc::new(hooks::allow_all),
            disconnect_hook: Arc::new(hooks::ignore_disconnect),
            id_generator: Arc::new(hooks::random_id),
            relay_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(30),
            max_send_queue: 256,
        }
    }
}

impl HubConfig {
    /// Defaults with the timing and queue tunables taken from settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            relay_interval: Duration::from_millis(settings.relay_interval_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            max_send_queue: settings.max_send_queue,
            ..Self::default()
        }
        .clamped()
    }

    /// Raise zero periods and queue sizes to their minimum. Timer intervals
    /// must be non-zero.
    pub(crate) fn clamped(mut self) -> Self {
        self.relay_interval = self.relay_interval.max(MIN_INTERVAL);
        self.heartbeat_interval = self.heartbeat_interval.max(MIN_INTERVAL);
        self.max_send_queue = self.max_send_queue.max(1);
        self
    }
}

impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("relay_interval", &self.relay_interval)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("max_send_queue", &self.max_send_queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HubConfig::default();
        assert_eq!(config.relay_interval, Duration::from_millis(100));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_send_queue, 256);
    }

    #[test]
    fn from_settings_copies_tunables() {
        let settings = ServerSettings {
            relay_interval_ms: 25,
            heartbeat_interval_ms: 1000,
            max_send_queue: 8,
            ..Default::default()
        };
        let config = HubConfig::from_settings(&settings);
        assert_eq!(config.relay_interval, Duration::from_millis(25));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.max_send_queue, 8);
    }

    #[test]
    fn zero_values_are_clamped() {
        let settings = ServerSettings {
            relay_interval_ms: 0,
            heartbeat_interval_ms: 0,
            max_send_queue: 0,
            ..Default::default()
        };
        let config = HubConfig::from_settings(&settings);
        assert_eq!(config.relay_interval, Duration::from_millis(1));
        assert_eq!(config.max_send_queue, 1);
    }

    #[test]
    fn clamped_raises_zero_durations() {
        let config = HubConfig {
            relay_interval: Duration::ZERO,
            heartbeat_interval: Duration::ZERO,
            ..HubConfig::default()
        }
        .clamped();
        assert_eq!(config.relay_interval, MIN_INTERVAL);
        assert_eq!(config.heartbeat_interval, MIN_INTERVAL);
        assert_eq!(config.max_send_queue, 256);
    }
}
