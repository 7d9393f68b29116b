//! # hubbub-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HubbubSettings::default()`]
//! 2. **Settings file**: `~/.hubbub/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `SCALE`, `NATS_*` and `HUBBUB_*` overrides
//!
//! The loaded value is handed to the server at startup and never changes
//! afterwards; there is no process-wide settings global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
