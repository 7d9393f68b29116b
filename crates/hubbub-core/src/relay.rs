use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;
use crate::events::Event;

/// One message on the relay bus.
///
/// Exactly one of `recipient_ids` non-empty or `all == true` holds for every
/// message that reaches a [`Relayer`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayMessage {
    pub message: Event,
    #[serde(rename = "recipientIds")]
    pub recipient_ids: Vec<String>,
    pub all: bool,
}

impl RelayMessage {
    pub fn to_recipients(message: Event, recipient_ids: Vec<String>) -> Self {
        Self {
            message,
            recipient_ids,
            all: false,
        }
    }

    pub fn to_all(message: Event) -> Self {
        Self {
            message,
            recipient_ids: Vec::new(),
            all: true,
        }
    }

    /// No recipients and not a broadcast: must not be published.
    pub fn is_trivial(&self) -> bool {
        !self.all && self.recipient_ids.is_empty()
    }
}

/// Cross-connection (and, for distributed backends, cross-process) bus.
#[async_trait]
pub trait Relayer: Send + Sync {
    async fn broadcast(&self, message: RelayMessage) -> Result<(), RelayError>;

    /// Drain everything buffered for this process. Each message is returned
    /// once; a second call with no intervening broadcast returns nothing.
    fn receive_broadcasts(&self) -> Vec<RelayMessage>;
}

/// Single-process relayer: an append-only buffer swapped out on every drain.
#[derive(Default)]
pub struct InMemoryRelayer {
    messages: Mutex<Vec<RelayMessage>>,
}

impl InMemoryRelayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.messages.lock().len()
    }
}

#[async_trait]
impl Relayer for InMemoryRelayer {
    async fn broadcast(&self, message: RelayMessage) -> Result<(), RelayError> {
        if message.is_trivial() {
            tracing::trace!("skipping relay message with no recipients");
            return Ok(());
        }
        self.messages.lock().push(message);
        Ok(())
    }

    fn receive_broadcasts(&self) -> Vec<RelayMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn sample(recipients: &[&str]) -> RelayMessage {
        RelayMessage::to_recipients(
            Event::to_client("a", "Ping", json!(null)),
            recipients.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn trivial_detection() {
        assert!(sample(&[]).is_trivial());
        assert!(!sample(&["a"]).is_trivial());
        assert!(!RelayMessage::to_all(Event::default()).is_trivial());
    }

    #[test]
    fn wire_shape() {
        let msg = sample(&["a", "b"]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["recipientIds"], json!(["a", "b"]));
        assert_eq!(value["all"], false);
        assert_eq!(value["message"]["type"], "Ping");
        assert_eq!(value["message"]["eventTarget"], 1);
    }

    #[tokio::test]
    async fn drain_returns_each_message_once() {
        let relayer = InMemoryRelayer::new();
        relayer.broadcast(sample(&["a"])).await.unwrap();
        relayer.broadcast(RelayMessage::to_all(Event::default())).await.unwrap();

        let first = relayer.receive_broadcasts();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].recipient_ids, vec!["a".to_string()]);
        assert!(first[1].all);

        assert!(relayer.receive_broadcasts().is_empty());
    }

    #[tokio::test]
    async fn trivial_messages_are_not_buffered() {
        let relayer = InMemoryRelayer::new();
        relayer.broadcast(sample(&[])).await.unwrap();
        assert_eq!(relayer.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_broadcasts_are_all_drained() {
        let relayer = Arc::new(InMemoryRelayer::new());
        let mut handles = vec![];
        for i in 0..20 {
            let relayer = Arc::clone(&relayer);
            handles.push(tokio::spawn(async move {
                relayer.broadcast(sample(&[&format!("c{i}")])).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(relayer.receive_broadcasts().len(), 20);
        assert!(relayer.receive_broadcasts().is_empty());
    }
}
