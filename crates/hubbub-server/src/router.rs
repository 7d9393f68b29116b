use std::sync::Arc;
use std::time::Instant;

use hubbub_core::{Backends, Engine, Event, EventError, RelayMessage, Target};
use hubbub_telemetry::MetricsRecorder;
use tracing::{debug, trace};

/// Runs the engine and turns every event it produces into group mutations or
/// relay publications.
pub struct EventRouter {
    engine: Arc<dyn Engine>,
    backends: Backends,
    metrics: Arc<MetricsRecorder>,
}

impl EventRouter {
    pub fn new(engine: Arc<dyn Engine>, backends: Backends, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            engine,
            backends,
            metrics,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Hand a client event to the engine and route its output in order.
    /// Every response is attempted; the first routing failure is returned.
    pub async fn dispatch(&self, event: Event) -> Result<(), EventError> {
        let started = Instant::now();
        let result = self.dispatch_inner(event).await;
        self.metrics.histogram_observe(
            "hub.dispatch.duration_ms",
            &[],
            started.elapsed().as_secs_f64() * 1000.0,
        );
        result
    }

    async fn dispatch_inner(&self, event: Event) -> Result<(), EventError> {
        let responses = self.engine.handle_event(event).await?;
        trace!(count = responses.len(), "engine produced events");
        let mut first_error = None;
        for response in responses {
            if let Err(err) = self.route(response).await {
                debug!(kind = err.error_kind(), error = %err, "routing failed, continuing");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Route one already-addressed event without involving the engine.
    pub async fn route(&self, event: Event) -> Result<(), EventError> {
        let message = match event.dest {
            Target::Client => RelayMessage::to_recipients(event.clone(), vec![event.dest_id.clone()]),
            Target::JoinGroup => {
                self.backends
                    .groups
                    .add_to_group(&event.source_id, &event.dest_id)
                    .await?;
                debug!(conn_id = %event.source_id, group_id = %event.dest_id, "joined group");
                return Ok(());
            }
            Target::LeaveGroup => {
                self.backends
                    .groups
                    .remove_from_group(&event.source_id, &event.dest_id)
                    .await?;
                debug!(conn_id = %event.source_id, group_id = %event.dest_id, "left group");
                return Ok(());
            }
            Target::Group => {
                let members = self.backends.groups.group_members(&event.dest_id).await?;
                RelayMessage::to_recipients(event, members)
            }
            Target::ClientBroadcast | Target::ServerBroadcast => RelayMessage::to_all(event),
            Target::Server | Target::None => {
                trace!(event_type = %event.event_type, dest = %event.dest, "dropping unroutable event");
                return Ok(());
            }
        };

        if message.is_trivial() {
            trace!(event_type = %message.message.event_type, "no recipients, skipping relay");
            return Ok(());
        }

        let kind = if message.all { "all" } else { message.message.dest.as_str() };
        debug!(
            event_type = %message.message.event_type,
            recipients = message.recipient_ids.len(),
            all = message.all,
            "broadcasting"
        );
        self.backends.relayer.broadcast(message).await?;
        self.metrics.counter_inc("hub.relay.broadcasts", &[("kind", kind)], 1);
        Ok(())
    }
}
