//! Layered settings: compiled defaults, then the JSON settings file merged
//! over them, then environment variables on top.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{HubbubSettings, ScalingMode};

/// `~/.hubbub/settings.json`, falling back to `/tmp` without `HOME`.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".hubbub")
        .join("settings.json")
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<HubbubSettings> {
    load_settings_from_path(&settings_path())
}

/// File layer plus process environment. A missing file yields defaults; a
/// file that is not valid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HubbubSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<HubbubSettings> {
    let mut layered = serde_json::to_value(HubbubSettings::default())?;
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        layered = deep_merge(layered, serde_json::from_str(&raw)?);
        debug!(path = %path.display(), "merged settings file");
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
    }
    Ok(serde_json::from_value(layered)?)
}

/// Merge `overlay` into `base`. Objects merge key by key, `null` in the
/// overlay keeps the base value, anything else replaces it.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut HubbubSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_overrides(settings: &mut HubbubSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("HUBBUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("HUBBUB_PORT", 0u16..=u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.number("HUBBUB_MAX_SEND_QUEUE", 1usize..=1_000_000) {
        settings.server.max_send_queue = v;
    }
    if let Some(v) = env.number("HUBBUB_RELAY_INTERVAL_MS", 1u64..=60_000) {
        settings.server.relay_interval_ms = v;
    }
    if let Some(v) = env.number("HUBBUB_HEARTBEAT_INTERVAL_MS", 1000u64..=600_000) {
        settings.server.heartbeat_interval_ms = v;
    }

    // ── Scaling ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SCALE") {
        match v.parse::<ScalingMode>() {
            Ok(mode) => settings.scaling.mode = mode,
            Err(e) => tracing::warn!(key = "SCALE", value = %v, error = %e, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = env.string("NATS_ADDR") {
        settings.scaling.nats.address = v;
    }
    if let Some(v) = env.string("NATS_RELAY_SUBJECT") {
        settings.scaling.nats.relay_subject = v;
    }
    if let Some(v) = env.string("NATS_GROUP_BUCKET") {
        settings.scaling.nats.group_bucket = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("HUBBUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("HUBBUB_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Value parsing ───────────────────────────────────────────────────────────

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only when it falls inside `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn number<T>(&self, name: &str, range: RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd + Clone,
    {
        self.parsed(name, "number", |v| parse_in_range(v, range.clone()))
    }
}
