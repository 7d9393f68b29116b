use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::hooks::ConnectRequest;
use crate::hub::Hub;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Scaling mode label reported by `/health`.
    pub mode: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            mode: "SINGLETON".to_string(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub mode: Arc<str>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, start the hub's relay drain and serve. Returns a handle to shut
/// everything down.
pub async fn start(config: ServerConfig, hub: Hub) -> Result<ServerHandle, std::io::Error> {
    let drain = hub.start();

    let state = AppState {
        hub: hub.clone(),
        mode: Arc::from(config.mode.as_str()),
    };
    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, mode = %config.mode, "hubbub server started");

    let stop = CancellationToken::new();
    let server_stop = stop.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(server_stop.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        hub,
        stop,
        server,
        _drain: drain,
    })
}

/// Handle returned by [`start`]; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    hub: Hub,
    stop: CancellationToken,
    server: JoinHandle<()>,
    _drain: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Close every connection, stop the relay drain and wait for the HTTP
    /// server to finish.
    pub async fn shutdown(self) {
        self.hub.shutdown();
        self.stop.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
        tracing::info!("hubbub server stopped");
    }
}

/// WebSocket upgrade handler. The connect hook runs before the upgrade and
/// its rejection becomes the HTTP response.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = ConnectRequest::new(uri, headers);
    if let Err(rejection) = state.hub.accept(&request) {
        tracing::info!(status = %rejection.status, reason = %rejection.message, "connection refused");
        return rejection.into_response();
    }
    ws.on_upgrade(move |socket| async move { state.hub.serve_socket(socket, request).await })
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.hub.connection_count(),
        "mode": &*state.mode,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.metrics().snapshot())
}
