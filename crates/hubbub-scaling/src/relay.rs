use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use hubbub_core::{RelayError, RelayMessage, Relayer};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ScalingError;

/// Local buffer filled by a background subscription task.
///
/// The task is aborted when the buffer is dropped.
pub struct RelayBuffer {
    pending: Arc<Mutex<Vec<Bytes>>>,
    task: JoinHandle<()>,
}

impl RelayBuffer {
    /// Spawn a task appending every payload of `incoming` to the buffer.
    pub fn spawn<S>(incoming: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pending);
        let task = tokio::spawn(async move {
            tokio::pin!(incoming);
            while let Some(payload) = incoming.next().await {
                trace!(bytes = payload.len(), "relay payload buffered");
                sink.lock().push(payload);
            }
            info!("relay subscription ended");
        });
        Self { pending, task }
    }

    /// Swap the buffer out and decode it. Undecodable payloads are logged
    /// and skipped.
    pub fn drain(&self) -> Vec<RelayMessage> {
        let raw = std::mem::take(&mut *self.pending.lock());
        let mut messages = Vec::with_capacity(raw.len());
        for payload in raw {
            match serde_json::from_slice::<RelayMessage>(&payload) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(error = %e, bytes = payload.len(), "dropping undecodable relay payload"),
            }
        }
        if !messages.is_empty() {
            debug!(count = messages.len(), "relay broadcasts consumed");
        }
        messages
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Drop for RelayBuffer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Relayer publishing to a NATS subject that every hub process subscribes to.
/// Each process receives every broadcast, its own included.
pub struct NatsRelayer {
    client: async_nats::Client,
    subject: String,
    buffer: RelayBuffer,
}

impl NatsRelayer {
    /// Subscribe to `subject` and start buffering.
    pub async fn subscribe(
        client: async_nats::Client,
        subject: impl Into<String>,
    ) -> Result<Self, ScalingError> {
        let subject = subject.into();
        let subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| ScalingError::Subscribe(e.to_string()))?;
        info!(subject = %subject, "subscribed to relay subject");
        let buffer = RelayBuffer::spawn(subscriber.map(|msg| msg.payload));
        Ok(Self {
            client,
            subject,
            buffer,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl Relayer for NatsRelayer {
    async fn broadcast(&self, message: RelayMessage) -> Result<(), RelayError> {
        if message.is_trivial() {
            trace!("skipping relay message with no recipients");
            return Ok(());
        }
        let payload = Bytes::from(serde_json::to_vec(&message)?);
        self.client
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))
    }

    fn receive_broadcasts(&self) -> Vec<RelayMessage> {
        self.buffer.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::SinkExt;
    use hubbub_core::Event;
    use serde_json::json;
    use std::time::Duration;

    fn encoded(message: &RelayMessage) -> Bytes {
        Bytes::from(serde_json::to_vec(message).unwrap())
    }

    async fn wait_for(buffer: &RelayBuffer, n: usize) {
        for _ in 0..100 {
            if buffer.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("buffer never reached {n} payloads");
    }

    #[tokio::test]
    async fn drain_decodes_and_empties() {
        let (mut tx, rx) = mpsc::unbounded::<Bytes>();
        let buffer = RelayBuffer::spawn(rx);

        let direct = RelayMessage::to_recipients(
            Event::to_client("a", "Ping", json!({"n": 1})),
            vec!["a".into()],
        );
        let all = RelayMessage::to_all(Event::broadcast("Announce", json!("hi")));
        tx.send(encoded(&direct)).await.unwrap();
        tx.send(encoded(&all)).await.unwrap();
        wait_for(&buffer, 2).await;

        let drained = buffer.drain();
        assert_eq!(drained, vec![direct, all]);
        assert!(buffer.drain().is_empty());
    }

    #[tokio::test]
    async fn undecodable_payloads_are_skipped() {
        let (mut tx, rx) = mpsc::unbounded::<Bytes>();
        let buffer = RelayBuffer::spawn(rx);

        tx.send(Bytes::from_static(b"not json")).await.unwrap();
        let good = RelayMessage::to_all(Event::broadcast("Announce", json!(null)));
        tx.send(encoded(&good)).await.unwrap();
        wait_for(&buffer, 2).await;

        assert_eq!(buffer.drain(), vec![good]);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn wire_payload_matches_relay_message_shape() {
        let message = RelayMessage::to_recipients(
            Event::to_group("g1", "GameChat", json!("hello")),
            vec!["a".into(), "b".into()],
        );
        let value: serde_json::Value = serde_json::from_slice(&encoded(&message)).unwrap();
        assert_eq!(value["recipientIds"], json!(["a", "b"]));
        assert_eq!(value["all"], json!(false));
        assert_eq!(value["message"]["type"], json!("GameChat"));
    }
}
