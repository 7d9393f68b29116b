use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hubbub_core::{ConnectionId, Event, EventError, Target};
use serde_json::Value;

/// Owned snapshot of the upgrade request, handed to every hook for the
/// lifetime of the connection.
#[derive(Clone, Debug, Default)]
pub struct ConnectRequest {
    uri: Uri,
    headers: HeaderMap,
}

impl ConnectRequest {
    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self { uri, headers }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of `name` if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Percent-decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(&self.uri).ok()?;
        params.remove(name)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header(header::AUTHORIZATION.as_str())?;
        let (scheme, token) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            Some(token.trim())
        } else {
            None
        }
    }
}

/// Refusal returned by a connect hook. Sent as the HTTP response in place of
/// the upgrade.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ConnectRejection {
    pub status: StatusCode,
    pub message: String,
}

impl ConnectRejection {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl IntoResponse for ConnectRejection {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// `(event type, payload, request) -> frame text`.
pub type Serializer = Arc<dyn Fn(&str, &Value, &ConnectRequest) -> Result<String, EventError> + Send + Sync>;
/// `(frame text, request) -> (event type, payload)`.
pub type Deserializer =
    Arc<dyn Fn(&str, &ConnectRequest) -> Result<(String, Value), EventError> + Send + Sync>;
/// Turns a failed event into the event reported back to its sender.
pub type ErrorHandler = Arc<dyn Fn(&Event, &EventError) -> Event + Send + Sync>;
pub type ConnectHook = Arc<dyn Fn(&ConnectRequest) -> Result<(), ConnectRejection> + Send + Sync>;
pub type DisconnectHook = Arc<dyn Fn(&ConnectionId, &ConnectRequest) + Send + Sync>;
pub type IdGenerator = Arc<dyn Fn(&ConnectRequest) -> ConnectionId + Send + Sync>;

/// Report the error to the connection that sent `event`, keeping its metadata.
pub fn default_error_handler(event: &Event, err: &EventError) -> Event {
    Event {
        source: Target::Server,
        source_id: String::new(),
        dest: Target::Client,
        dest_id: event.source_id.clone(),
        event_type: "Error".to_string(),
        payload: Value::String(err.to_string()),
        metadata: event.metadata.clone(),
    }
}

pub fn allow_all(_request: &ConnectRequest) -> Result<(), ConnectRejection> {
    Ok(())
}

pub fn ignore_disconnect(_id: &ConnectionId, _request: &ConnectRequest) {}

pub fn random_id(_request: &ConnectRequest) -> ConnectionId {
    ConnectionId::new()
}
