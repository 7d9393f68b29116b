use hubbub_settings::ScalingMode;

/// Startup failures while wiring scaling backends. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ScalingError {
    #[error("scaling mode {0} is not supported")]
    Unsupported(ScalingMode),
    #[error("failed to connect to nats: {0}")]
    Connect(String),
    #[error("key-value bucket error: {0}")]
    KeyValue(String),
    #[error("failed to subscribe: {0}")]
    Subscribe(String),
}

impl ScalingError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported",
            Self::Connect(_) => "connect",
            Self::KeyValue(_) => "key_value",
            Self::Subscribe(_) => "subscribe",
        }
    }
}
