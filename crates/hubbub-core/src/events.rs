use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Logical origin or destination role of an [`Event`].
///
/// Serialized as its integer discriminant so the wire format stays stable
/// across processes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Target {
    /// Source: server-side broadcast. Dest: destination of record for
    /// anything a client sends.
    #[default]
    Server = 0,
    /// Source: a client. Dest: one specific client named by `dest_id`.
    Client = 1,
    /// Router directive: add `source_id` to group `dest_id`. Never on the wire.
    JoinGroup = 2,
    /// Router directive: remove `source_id` from group `dest_id`. Never on the wire.
    LeaveGroup = 3,
    /// Every current member of group `dest_id`.
    Group = 4,
    ServerBroadcast = 5,
    ClientBroadcast = 6,
    /// Dropped silently.
    None = 7,
}

impl Target {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Server),
            1 => Some(Self::Client),
            2 => Some(Self::JoinGroup),
            3 => Some(Self::LeaveGroup),
            4 => Some(Self::Group),
            5 => Some(Self::ServerBroadcast),
            6 => Some(Self::ClientBroadcast),
            7 => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Fans out to every connection on every process.
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::ServerBroadcast | Self::ClientBroadcast)
    }

    /// Consumed by the router, never serialized to a socket.
    pub fn is_directive(self) -> bool {
        matches!(self, Self::JoinGroup | Self::LeaveGroup)
    }

    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::JoinGroup => "join_group",
            Self::LeaveGroup => "leave_group",
            Self::Group => "group",
            Self::ServerBroadcast => "server_broadcast",
            Self::ClientBroadcast => "client_broadcast",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Target::from_u8(raw).ok_or_else(|| D::Error::custom(format!("unknown event target {raw}")))
    }
}

/// Envelope routed through the hub.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub source: Target,
    /// Originating connection id when `source` is [`Target::Client`].
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(rename = "eventTarget")]
    pub dest: Target,
    /// A connection id or a group id depending on `dest`.
    #[serde(rename = "destinationId")]
    pub dest_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Frame a decoded client message, addressed to the server.
    pub fn from_client(conn_id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            source: Target::Client,
            source_id: conn_id.into(),
            dest: Target::Server,
            event_type: event_type.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn to_client(conn_id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            source: Target::Server,
            dest: Target::Client,
            dest_id: conn_id.into(),
            event_type: event_type.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn to_group(group_id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            source: Target::Server,
            dest: Target::Group,
            dest_id: group_id.into(),
            event_type: event_type.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn broadcast(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            source: Target::Server,
            dest: Target::ClientBroadcast,
            event_type: event_type.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn join_group(conn_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            source: Target::Server,
            source_id: conn_id.into(),
            dest: Target::JoinGroup,
            dest_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn leave_group(conn_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            source: Target::Server,
            source_id: conn_id.into(),
            dest: Target::LeaveGroup,
            dest_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
