//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! settings file only needs the keys it overrides.

mod scaling;
mod server;

pub use scaling::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "scaling": { "mode": "COLOCATED", "nats": { "address": "nats://nats:4222" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubbubSettings {
    pub server: ServerSettings,
    pub scaling: ScalingSettings,
    pub logging: LoggingSettings,
}
