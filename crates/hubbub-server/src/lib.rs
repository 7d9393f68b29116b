//! # hubbub-server
//!
//! WebSocket connection manager for the hub: per-connection read/write
//! loops, the event router, the process-wide relay drain and the axum HTTP
//! surface (`/ws`, `/health`, `/metrics`).

pub mod codec;
pub mod config;
mod connection;
pub mod drain;
pub mod hooks;
pub mod hub;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod server;

pub use config::HubConfig;
pub use hooks::{ConnectRejection, ConnectRequest};
pub use hub::{Hub, HubBuilder};
pub use middleware::{Middleware, MiddlewareChain};
pub use registry::{ConnectionRegistry, Delivery};
pub use router::EventRouter;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
