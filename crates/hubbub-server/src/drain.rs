use std::sync::Arc;
use std::time::Duration;

use hubbub_core::Relayer;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::{ConnectionRegistry, Delivery};

/// Pull everything the relayer buffered and push it into local queues.
/// Recipients without a local connection are skipped. Returns how many
/// queue pushes succeeded.
pub fn drain_once(relayer: &dyn Relayer, registry: &ConnectionRegistry) -> usize {
    let mut delivered = 0;
    for message in relayer.receive_broadcasts() {
        if message.all {
            delivered += registry.deliver_all(&message.message);
            continue;
        }
        for recipient in &message.recipient_ids {
            if !registry.contains(recipient) {
                continue;
            }
            tracing::trace!(conn_id = %recipient, event_type = %message.message.event_type, "relaying to local connection");
            if registry.deliver(recipient, message.message.clone()) == Delivery::Delivered {
                delivered += 1;
            }
        }
    }
    delivered
}

/// Poll the relayer every `interval` until `shutdown` fires.
pub fn spawn_relay_drain(
    relayer: Arc<dyn Relayer>,
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = interval.as_millis() as u64, "relay drain started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let delivered = drain_once(relayer.as_ref(), &registry);
                    if delivered > 0 {
                        tracing::trace!(delivered, "relay drain pass");
                    }
                }
            }
        }
        tracing::info!("relay drain stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubbub_core::{ConnectionId, Event, InMemoryRelayer, RelayMessage};
    use hubbub_telemetry::MetricsRecorder;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryRelayer>, Arc<ConnectionRegistry>) {
        (
            Arc::new(InMemoryRelayer::new()),
            Arc::new(ConnectionRegistry::new(8, Arc::new(MetricsRecorder::new()))),
        )
    }

    #[tokio::test]
    async fn directed_messages_reach_only_local_recipients() {
        let (relayer, registry) = setup();
        let mut a = registry.register(ConnectionId::from_raw("a"));
        let mut b = registry.register(ConnectionId::from_raw("b"));

        relayer
            .broadcast(RelayMessage::to_recipients(
                Event::to_group("g1", "GameChat", json!("hi")),
                vec!["a".into(), "elsewhere".into()],
            ))
            .await
            .unwrap();

        assert_eq!(drain_once(relayer.as_ref(), &registry), 1);
        assert_eq!(a.receiver.try_recv().unwrap().event_type, "GameChat");
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn all_messages_reach_everyone() {
        let (relayer, registry) = setup();
        let mut a = registry.register(ConnectionId::from_raw("a"));
        let mut b = registry.register(ConnectionId::from_raw("b"));

        relayer
            .broadcast(RelayMessage::to_all(Event::broadcast("Announce", json!("hello"))))
            .await
            .unwrap();

        assert_eq!(drain_once(relayer.as_ref(), &registry), 2);
        assert!(a.receiver.try_recv().is_ok());
        assert!(b.receiver.try_recv().is_ok());
        assert_eq!(drain_once(relayer.as_ref(), &registry), 0);
    }

    #[tokio::test]
    async fn stalled_connection_does_not_block_others() {
        let relayer = Arc::new(InMemoryRelayer::new());
        let registry = Arc::new(ConnectionRegistry::new(1, Arc::new(MetricsRecorder::new())));
        let _stalled = registry.register(ConnectionId::from_raw("stalled"));
        let mut live = registry.register(ConnectionId::from_raw("live"));

        for i in 0..3 {
            relayer
                .broadcast(RelayMessage::to_recipients(
                    Event::to_client("stalled", "Tick", json!(i)),
                    vec!["stalled".into()],
                ))
                .await
                .unwrap();
        }
        relayer
            .broadcast(RelayMessage::to_recipients(
                Event::to_client("live", "Tick", json!(0)),
                vec!["live".into()],
            ))
            .await
            .unwrap();

        drain_once(relayer.as_ref(), &registry);
        assert_eq!(live.receiver.try_recv().unwrap().payload, json!(0));
    }

    #[tokio::test]
    async fn loop_delivers_and_stops_on_shutdown() {
        let (relayer, registry) = setup();
        let mut a = registry.register(ConnectionId::from_raw("a"));
        let shutdown = CancellationToken::new();
        let handle = spawn_relay_drain(
            relayer.clone(),
            Arc::clone(&registry),
            Duration::from_millis(10),
            shutdown.clone(),
        );

        relayer
            .broadcast(RelayMessage::to_recipients(
                Event::to_client("a", "Ping", json!(null)),
                vec!["a".into()],
            ))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), a.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, "Ping");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
