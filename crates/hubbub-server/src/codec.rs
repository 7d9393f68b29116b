//! Frame codecs: turning socket text into `(event type, payload)` and back.

use std::sync::Arc;

use hubbub_core::EventError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hooks::{ConnectRequest, Deserializer, Serializer};

/// Untyped frames: the whole text becomes the payload, the event type is empty.
pub fn passthrough_deserializer(raw: &str, _request: &ConnectRequest) -> Result<(String, Value), EventError> {
    Ok((String::new(), Value::String(raw.to_string())))
}

/// Debug-friendly `"{type}: {payload}"` text.
pub fn display_serializer(
    event_type: &str,
    payload: &Value,
    _request: &ConnectRequest,
) -> Result<String, EventError> {
    Ok(match payload {
        Value::String(s) => format!("{event_type}: {s}"),
        other => format!("{event_type}: {other}"),
    })
}

#[derive(Serialize)]
struct ShellOut<'a> {
    #[serde(rename = "messageType")]
    message_type: &'a str,
    message: &'a Value,
}

#[derive(Deserialize)]
struct ShellIn {
    #[serde(rename = "messageType")]
    message_type: String,
    #[serde(default)]
    message: Value,
}

/// Reads `{"messageType": "...", "message": ...}`.
pub fn json_shell_deserializer(raw: &str, _request: &ConnectRequest) -> Result<(String, Value), EventError> {
    let shell: ShellIn = serde_json::from_str(raw)?;
    if shell.message_type.is_empty() {
        return Err(EventError::frame("messageType must not be empty"));
    }
    Ok((shell.message_type, shell.message))
}

/// Writes `{"messageType": "...", "message": ...}`.
pub fn json_shell_serializer(
    event_type: &str,
    payload: &Value,
    _request: &ConnectRequest,
) -> Result<String, EventError> {
    serde_json::to_string(&ShellOut {
        message_type: event_type,
        message: payload,
    })
    .map_err(|e| EventError::Serialization(e.to_string()))
}

/// The JSON shell pair, ready to drop into a `HubConfig`.
pub fn json_shell() -> (Serializer, Deserializer) {
    (Arc::new(json_shell_serializer), Arc::new(json_shell_deserializer))
}
