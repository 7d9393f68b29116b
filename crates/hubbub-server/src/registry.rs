use std::sync::Arc;

use dashmap::DashMap;
use hubbub_core::{ConnectionId, Event};
use hubbub_telemetry::MetricsRecorder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of pushing one event into a connection's outbound queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Queue at capacity; the event was dropped.
    Full,
    /// Connection is tearing down; the event was dropped.
    Closed,
    /// No connection with that id on this process.
    NotFound,
}

/// A freshly registered connection's queue endpoints.
pub struct Registration {
    pub id: ConnectionId,
    /// Handle kept by the connection to prove ownership on unregister.
    pub sender: mpsc::Sender<Event>,
    pub receiver: mpsc::Receiver<Event>,
    /// Cancelled when a newer connection takes over the id.
    pub displaced: CancellationToken,
}

struct Slot {
    sender: mpsc::Sender<Event>,
    displaced: CancellationToken,
}

/// Local connections by id, each with a bounded outbound queue.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Slot>,
    max_send_queue: usize,
    metrics: Arc<MetricsRecorder>,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
            metrics,
        }
    }

    /// Register `id` with a fresh displacement token.
    pub fn register(&self, id: ConnectionId) -> Registration {
        self.register_with(id, CancellationToken::new())
    }

    /// Register `id`, cancelling `displaced` if a later registration takes
    /// the id over. A live connection already holding the id gets its own
    /// token cancelled and receives nothing more from the registry.
    pub fn register_with(&self, id: ConnectionId, displaced: CancellationToken) -> Registration {
        let (sender, receiver) = mpsc::channel(self.max_send_queue);
        let slot = Slot {
            sender: sender.clone(),
            displaced: displaced.clone(),
        };
        if let Some(previous) = self.connections.insert(id.clone(), slot) {
            tracing::warn!(conn_id = %id, "connection id reused, closing previous connection");
            previous.displaced.cancel();
        }
        self.metrics.counter_inc("hub.connections.opened", &[], 1);
        self.record_active();
        Registration {
            id,
            sender,
            receiver,
            displaced,
        }
    }

    /// Remove `id` only if it is still bound to `sender`. Returns whether an
    /// entry was removed.
    pub fn unregister(&self, id: &ConnectionId, sender: &mpsc::Sender<Event>) -> bool {
        let removed = self
            .connections
            .remove_if(id, |_, current| current.sender.same_channel(sender))
            .is_some();
        if removed {
            self.metrics.counter_inc("hub.connections.closed", &[], 1);
            self.record_active();
        }
        removed
    }

    /// Non-blocking push into one connection's queue.
    pub fn deliver(&self, id: &str, event: Event) -> Delivery {
        let Some(sender) = self.connections.get(id).map(|entry| entry.sender.clone()) else {
            return Delivery::NotFound;
        };
        self.push(id, &sender, event)
    }

    /// Push a copy of `event` to every local connection. Returns how many
    /// queues accepted it.
    pub fn deliver_all(&self, event: &Event) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<Event>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.sender.clone()))
            .collect();
        targets
            .iter()
            .filter(|(id, sender)| self.push(id.as_str(), sender, event.clone()) == Delivery::Delivered)
            .count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    fn push(&self, id: &str, sender: &mpsc::Sender<Event>, event: Event) -> Delivery {
        match sender.try_send(event) {
            Ok(()) => {
                self.metrics.counter_inc("hub.relay.delivered", &[], 1);
                Delivery::Delivered
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    conn_id = %id,
                    event_type = %event.event_type,
                    "send queue full, dropping event"
                );
                self.metrics.counter_inc("hub.relay.dropped", &[("reason", "full")], 1);
                Delivery::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(conn_id = %id, "send queue closed, dropping event");
                self.metrics.counter_inc("hub.relay.dropped", &[("reason", "closed")], 1);
                Delivery::Closed
            }
        }
    }

    fn record_active(&self) {
        self.metrics
            .gauge_set("hub.connections.active", &[], self.connections.len() as f64);
    }
}
