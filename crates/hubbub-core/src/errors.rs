/// Errors raised by a group store backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Optimistic-concurrency check failed: the record changed since it was read.
    #[error("revision conflict on {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::Backend(_) => "backend",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors raised while publishing to the relay bus.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

/// Per-event failures. All of these are recoverable: they are reported to the
/// originating connection through the error handler and the connection stays
/// open. Transport failures never take this path.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("{0}")]
    Engine(String),
    #[error("middleware rejected event: {0}")]
    Middleware(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("group store: {0}")]
    Group(#[from] StoreError),
    #[error("relay: {0}")]
    Relay(#[from] RelayError),
}

impl EventError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn middleware(msg: impl Into<String>) -> Self {
        Self::Middleware(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        Self::Frame(msg.into())
    }

    /// Event errors never close the connection; transport errors are handled
    /// by the connection loops directly.
    pub fn is_connection_fatal(&self) -> bool {
        false
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Engine(_) => "engine",
            Self::Middleware(_) => "middleware",
            Self::Serialization(_) => "serialization",
            Self::Group(_) => "group",
            Self::Relay(_) => "relay",
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        EventError::Frame(e.to_string())
    }
}
