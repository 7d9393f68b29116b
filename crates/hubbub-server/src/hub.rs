use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, Stream, StreamExt};
use hubbub_core::{Backends, Engine, Event, EventError};
use hubbub_telemetry::MetricsRecorder;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::connection;
use crate::drain;
use crate::hooks::{ConnectRejection, ConnectRequest};
use crate::middleware::MiddlewareChain;
use crate::registry::ConnectionRegistry;
use crate::router::EventRouter;

/// Everything a connection's loops share with the rest of the hub.
pub(crate) struct HubState {
    pub(crate) config: HubConfig,
    pub(crate) router: EventRouter,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) receive_middleware: MiddlewareChain,
    pub(crate) send_middleware: MiddlewareChain,
    pub(crate) metrics: Arc<MetricsRecorder>,
}

/// The connection manager: accepts sockets, runs their read/write loops and
/// the process-wide relay drain. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    state: Arc<HubState>,
    started: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn builder(engine: Arc<dyn Engine>) -> HubBuilder {
        HubBuilder::new(engine)
    }

    /// Start the relay-drain loop. Only the first call spawns it.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(drain::spawn_relay_drain(
            Arc::clone(&self.state.router.backends().relayer),
            Arc::clone(&self.state.registry),
            self.state.config.relay_interval,
            self.shutdown.clone(),
        ))
    }

    /// Run the connect hook for a pending upgrade.
    pub fn accept(&self, request: &ConnectRequest) -> Result<(), ConnectRejection> {
        (self.state.config.connect_hook)(request)
    }

    /// Serve an upgraded WebSocket until it closes.
    pub async fn serve_socket(&self, socket: WebSocket, request: ConnectRequest) {
        let (sink, stream) = socket.split();
        self.serve(stream, sink, request).await;
    }

    /// Serve any message stream/sink pair until it closes.
    pub async fn serve<R, W, E>(&self, reader: R, writer: W, request: ConnectRequest)
    where
        R: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
        W: Sink<Message> + Send + Unpin + 'static,
        W::Error: Display,
        E: Display + Send + 'static,
    {
        connection::run_connection(
            Arc::clone(&self.state),
            reader,
            writer,
            request,
            self.shutdown.child_token(),
        )
        .await;
    }

    /// Route an already-addressed event from server-side code, bypassing the
    /// engine.
    pub async fn send(&self, event: Event) -> Result<(), EventError> {
        self.state.router.route(event).await
    }

    pub fn connection_count(&self) -> usize {
        self.state.registry.count()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.state.metrics)
    }

    pub fn config(&self) -> &HubConfig {
        &self.state.config
    }

    /// Stop the relay drain and close every connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Collects the engine, configuration, backends and middleware for a [`Hub`].
pub struct HubBuilder {
    engine: Arc<dyn Engine>,
    config: HubConfig,
    backends: Option<Backends>,
    metrics: Option<Arc<MetricsRecorder>>,
    receive_middleware: MiddlewareChain,
    send_middleware: MiddlewareChain,
}

impl HubBuilder {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            config: HubConfig::default(),
            backends: None,
            metrics: None,
            receive_middleware: MiddlewareChain::new(),
            send_middleware: MiddlewareChain::new(),
        }
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to in-memory backends.
    pub fn backends(mut self, backends: Backends) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn add_receive_middleware<F>(mut self, layer: F) -> Self
    where
        F: Fn(Event, &ConnectRequest) -> Result<Event, EventError> + Send + Sync + 'static,
    {
        self.receive_middleware.push(Arc::new(layer));
        self
    }

    pub fn insert_receive_middleware<F>(mut self, layer: F) -> Self
    where
        F: Fn(Event, &ConnectRequest) -> Result<Event, EventError> + Send + Sync + 'static,
    {
        self.receive_middleware.insert_first(Arc::new(layer));
        self
    }

    pub fn add_send_middleware<F>(mut self, layer: F) -> Self
    where
        F: Fn(Event, &ConnectRequest) -> Result<Event, EventError> + Send + Sync + 'static,
    {
        self.send_middleware.push(Arc::new(layer));
        self
    }

    pub fn insert_send_middleware<F>(mut self, layer: F) -> Self
    where
        F: Fn(Event, &ConnectRequest) -> Result<Event, EventError> + Send + Sync + 'static,
    {
        self.send_middleware.insert_first(Arc::new(layer));
        self
    }

    /// Zero intervals and queue sizes are raised to their minimum.
    pub fn build(self) -> Hub {
        let config = self.config.clamped();
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsRecorder::new()));
        let backends = self.backends.unwrap_or_else(Backends::in_memory);
        let registry = Arc::new(ConnectionRegistry::new(
            config.max_send_queue,
            Arc::clone(&metrics),
        ));
        let router = EventRouter::new(self.engine, backends, Arc::clone(&metrics));
        Hub {
            state: Arc::new(HubState {
                config,
                router,
                registry,
                receive_middleware: self.receive_middleware,
                send_middleware: self.send_middleware,
                metrics,
            }),
            started: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }
}
