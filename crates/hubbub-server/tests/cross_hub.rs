//! Two hubs sharing one group store and one relay bus, the way separate
//! processes share a NATS bucket and subject.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use hubbub_core::{
    Backends, Engine, Event, EventError, GroupStore, InMemoryGroups, RelayError, RelayMessage,
    Relayer,
};
use hubbub_server::{codec, Hub, HubConfig, ServerConfig, ServerHandle};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

type Inbox = Arc<Mutex<Vec<RelayMessage>>>;

/// Pub/sub bus: every broadcast lands in every subscriber's inbox.
#[derive(Default)]
struct Bus {
    inboxes: Mutex<Vec<Inbox>>,
}

impl Bus {
    fn subscribe(self: &Arc<Self>) -> BusRelayer {
        let inbox = Inbox::default();
        self.inboxes.lock().push(Arc::clone(&inbox));
        BusRelayer {
            bus: Arc::clone(self),
            inbox,
        }
    }
}

/// One hub's view of the bus.
struct BusRelayer {
    bus: Arc<Bus>,
    inbox: Inbox,
}

#[async_trait]
impl Relayer for BusRelayer {
    async fn broadcast(&self, message: RelayMessage) -> Result<(), RelayError> {
        for inbox in self.bus.inboxes.lock().iter() {
            inbox.lock().push(message.clone());
        }
        Ok(())
    }

    fn receive_broadcasts(&self) -> Vec<RelayMessage> {
        std::mem::take(&mut *self.inbox.lock())
    }
}

/// JoinGame joins `message.gameId` and tells the group; GameChat goes to
/// `message.gameId`; Announce goes to everyone.
struct Rooms;

#[async_trait]
impl Engine for Rooms {
    async fn handle_event(&self, event: Event) -> Result<Vec<Event>, EventError> {
        let game = event.payload["gameId"].as_str().unwrap_or_default().to_string();
        match event.event_type.as_str() {
            "JoinGame" => Ok(vec![
                Event::join_group(event.source_id.clone(), game.clone()),
                Event::to_group(game, "PlayerJoined", json!(event.source_id)),
            ]),
            "GameChat" => Ok(vec![Event::to_group(game, "GameChat", event.payload["text"].clone())]),
            "Announce" => Ok(vec![Event::broadcast("Announce", event.payload)]),
            other => Err(EventError::engine(format!("unsupported event {other}"))),
        }
    }
}

struct Cluster {
    handles: Vec<ServerHandle>,
    groups: Arc<InMemoryGroups>,
}

impl Cluster {
    async fn boot(size: usize) -> Self {
        let groups = Arc::new(InMemoryGroups::new());
        let bus = Arc::new(Bus::default());
        let mut handles = Vec::with_capacity(size);
        for _ in 0..size {
            let (serializer, deserializer) = codec::json_shell();
            let config = HubConfig {
                serializer,
                deserializer,
                relay_interval: Duration::from_millis(10),
                ..HubConfig::default()
            };
            let backends = Backends::new(groups.clone(), Arc::new(bus.subscribe()));
            let hub = Hub::builder(Arc::new(Rooms))
                .config(config)
                .backends(backends)
                .build();
            let server_config = ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                mode: "COLOCATED".into(),
            };
            handles.push(hubbub_server::start(server_config, hub).await.unwrap());
        }
        Self { handles, groups }
    }

    async fn connect(&self, node: usize) -> WsStream {
        let url = format!("ws://127.0.0.1:{}/ws", self.handles[node].port);
        let (ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
        ws
    }

    async fn wait_for_connections(&self, node: usize, n: usize) {
        let hub = self.handles[node].hub();
        for _ in 0..200 {
            if hub.connection_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("node {node}: expected {n} connections, have {}", hub.connection_count());
    }

    async fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown().await;
        }
    }
}

async fn send(ws: &mut WsStream, message_type: &str, message: Value) {
    let frame = json!({"messageType": message_type, "message": message}).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn recv(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut WsStream) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET, ws.next()).await {
        panic!("unexpected frame {text}");
    }
}

#[tokio::test]
async fn group_event_reaches_members_on_both_hubs() {
    let cluster = Cluster::boot(2).await;
    let mut a = cluster.connect(0).await;
    let mut outsider = cluster.connect(0).await;
    let mut b = cluster.connect(1).await;
    cluster.wait_for_connections(0, 2).await;
    cluster.wait_for_connections(1, 1).await;

    send(&mut a, "JoinGame", json!({"gameId": "g1"})).await;
    assert_eq!(recv(&mut a).await["messageType"], "PlayerJoined");

    send(&mut b, "JoinGame", json!({"gameId": "g1"})).await;
    assert_eq!(recv(&mut a).await["messageType"], "PlayerJoined");
    assert_eq!(recv(&mut b).await["messageType"], "PlayerJoined");
    assert_eq!(cluster.groups.group_members("g1").await.unwrap().len(), 2);

    send(&mut a, "GameChat", json!({"gameId": "g1", "text": "across"})).await;
    assert_eq!(recv(&mut a).await, json!({"messageType": "GameChat", "message": "across"}));
    assert_eq!(recv(&mut b).await, json!({"messageType": "GameChat", "message": "across"}));
    assert_silent(&mut outsider).await;
    cluster.shutdown().await;
}

#[tokio::test]
async fn broadcast_reaches_every_hub() {
    let cluster = Cluster::boot(2).await;
    let mut a = cluster.connect(0).await;
    let mut b = cluster.connect(1).await;
    let mut c = cluster.connect(1).await;
    cluster.wait_for_connections(0, 1).await;
    cluster.wait_for_connections(1, 2).await;

    send(&mut b, "Announce", json!("maintenance at noon")).await;
    for ws in [&mut a, &mut b, &mut c] {
        assert_eq!(
            recv(ws).await,
            json!({"messageType": "Announce", "message": "maintenance at noon"})
        );
    }
    cluster.shutdown().await;
}
