//! Deployment-mode settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// How many processes share the hub state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalingMode {
    /// One process; groups and relay live in memory.
    #[default]
    Singleton,
    /// Several processes sharing one NATS cluster for groups and relay.
    Colocated,
    /// Reserved. Not implemented; startup fails fast.
    Distributed,
}

impl ScalingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Singleton => "SINGLETON",
            Self::Colocated => "COLOCATED",
            Self::Distributed => "DISTRIBUTED",
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalingMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SINGLETON" => Ok(Self::Singleton),
            "COLOCATED" => Ok(Self::Colocated),
            "DISTRIBUTED" => Ok(Self::Distributed),
            other => Err(SettingsError::InvalidValue(format!("unknown scaling mode: {other}"))),
        }
    }
}

/// Scaling mode plus the backend coordinates it needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScalingSettings {
    pub mode: ScalingMode,
    pub nats: NatsSettings,
}

/// NATS cluster used by the colocated backends.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatsSettings {
    pub address: String,
    /// Pub/sub subject every process publishes relay messages on.
    pub relay_subject: String,
    /// JetStream key-value bucket holding group membership.
    pub group_bucket: String,
    /// Entry TTL used when provisioning the bucket.
    pub bucket_ttl_hours: u64,
    /// History depth used when provisioning the bucket.
    pub bucket_history: i64,
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            address: "nats://127.0.0.1:4222".to_string(),
            relay_subject: "hubbub.relay".to_string(),
            group_bucket: "hubbub-groups".to_string(),
            bucket_ttl_hours: 240,
            bucket_history: 3,
        }
    }
}
