use async_trait::async_trait;

use crate::errors::EventError;
use crate::events::Event;

/// Business logic plugged into the hub.
///
/// Receives one inbound event (already framed as client → server) and returns
/// the events it produces. Called concurrently from every connection's read
/// task; any per-game serialization is the implementation's job.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<Vec<Event>, EventError>;
}
