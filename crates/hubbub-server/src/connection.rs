use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use hubbub_core::{ConnectionId, Event, Target};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::hooks::ConnectRequest;
use crate::hub::HubState;

/// How long the surviving loop gets to wind down after its peer exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Run one connection to completion.
///
/// The read task decodes frames, runs receive middleware and dispatches to
/// the router; failures are answered on a private reply queue. The write task
/// owns the socket sink and multiplexes that reply queue, the connection's
/// registry queue and the heartbeat. Whichever task ends first (close, error,
/// panic, hub shutdown or a newer connection taking the id) ends the
/// connection: deregister, cancel, then the disconnect hook, once.
pub(crate) async fn run_connection<R, W, E>(
    state: Arc<HubState>,
    reader: R,
    writer: W,
    request: ConnectRequest,
    token: CancellationToken,
) where
    R: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
    W: Sink<Message> + Send + Unpin + 'static,
    W::Error: Display,
    E: Display + Send + 'static,
{
    let id = (state.config.id_generator)(&request);
    let request = Arc::new(request);
    let registration = state.registry.register_with(id.clone(), token.clone());
    info!(conn_id = %id, "connection opened");

    let (reply_tx, reply_rx) = mpsc::channel(state.config.max_send_queue.max(1));

    let mut read_task = tokio::spawn(read_loop(
        Arc::clone(&state),
        id.clone(),
        Arc::clone(&request),
        reader,
        reply_tx,
        token.clone(),
    ));
    let mut write_task = tokio::spawn(write_loop(
        Arc::clone(&state),
        id.clone(),
        Arc::clone(&request),
        writer,
        registration.receiver,
        reply_rx,
        token.clone(),
    ));

    let remaining = tokio::select! {
        res = &mut read_task => {
            report_exit(&id, "read", res);
            write_task
        }
        res = &mut write_task => {
            report_exit(&id, "write", res);
            read_task
        }
    };
    token.cancel();
    let abort = remaining.abort_handle();
    if tokio::time::timeout(SHUTDOWN_GRACE, remaining).await.is_err() {
        debug!(conn_id = %id, "connection task did not stop in time, aborting");
        abort.abort();
    }

    state.registry.unregister(&id, &registration.sender);
    let hook = Arc::clone(&state.config.disconnect_hook);
    if catch_unwind(AssertUnwindSafe(|| hook(&id, &*request))).is_err() {
        error!(conn_id = %id, "disconnect hook panicked");
    }
    info!(conn_id = %id, "connection closed");
}

fn report_exit(id: &ConnectionId, side: &str, res: Result<(), JoinError>) {
    match res {
        Ok(()) => debug!(conn_id = %id, side, "connection loop finished"),
        Err(e) if e.is_panic() => error!(conn_id = %id, side, "connection loop panicked"),
        Err(e) => debug!(conn_id = %id, side, error = %e, "connection loop cancelled"),
    }
}

async fn read_loop<R, E>(
    state: Arc<HubState>,
    id: ConnectionId,
    request: Arc<ConnectRequest>,
    mut reader: R,
    replies: mpsc::Sender<Event>,
    token: CancellationToken,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = reader.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Some(reply) = handle_frame(&state, &id, &request, text.as_str()).await {
                    if replies.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Some(Ok(Message::Close(_))) => {
                info!(conn_id = %id, "connection closed by client");
                break;
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(conn_id = %id, bytes = data.len(), "ignoring binary frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(conn_id = %id, error = %e, "read failed, closing connection");
                break;
            }
            None => break,
        }
    }
}

/// Decode, run receive middleware and dispatch one text frame. Returns the
/// error event to send back when any stage fails.
async fn handle_frame(
    state: &HubState,
    id: &ConnectionId,
    request: &ConnectRequest,
    text: &str,
) -> Option<Event> {
    state.metrics.counter_inc("hub.events.received", &[], 1);

    let (event_type, payload) = match (state.config.deserializer)(text, request) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(conn_id = %id, error = %err, "malformed frame");
            state.metrics.counter_inc("hub.events.rejected", &[("stage", "frame")], 1);
            let blank = Event::from_client(id.as_str(), "", Value::Null);
            return Some((state.config.error_handler)(&blank, &err));
        }
    };

    let event = Event::from_client(id.as_str(), event_type, payload);
    let event = match state.receive_middleware.run(event, request) {
        Ok(event) => event,
        Err(rejected) => {
            debug!(conn_id = %id, error = %rejected.error, "receive middleware rejected event");
            state.metrics.counter_inc("hub.events.rejected", &[("stage", "receive_middleware")], 1);
            return Some((state.config.error_handler)(&rejected.original, &rejected.error));
        }
    };

    trace!(conn_id = %id, event_type = %event.event_type, "dispatching");
    match state.router.dispatch(event.clone()).await {
        Ok(()) => None,
        Err(err) => {
            debug!(conn_id = %id, event_type = %event.event_type, kind = err.error_kind(), error = %err, "dispatch failed");
            state.metrics.counter_inc("hub.events.rejected", &[("stage", err.error_kind())], 1);
            Some((state.config.error_handler)(&event, &err))
        }
    }
}

async fn write_loop<W>(
    state: Arc<HubState>,
    id: ConnectionId,
    request: Arc<ConnectRequest>,
    mut writer: W,
    mut outbound: mpsc::Receiver<Event>,
    mut replies: mpsc::Receiver<Event>,
    token: CancellationToken,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let period = state.config.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            Some(event) = replies.recv() => event,
            event = outbound.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = heartbeat.tick() => {
                if let Err(e) = writer.send(Message::Ping(Bytes::new())).await {
                    warn!(conn_id = %id, error = %e, "heartbeat failed, closing connection");
                    break;
                }
                trace!(conn_id = %id, "sent ping");
                continue;
            }
        };

        if let Err(e) = write_event(&state, &id, &request, &mut writer, event).await {
            warn!(conn_id = %id, error = %e, "write failed, closing connection");
            break;
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: "".into(),
    }));
    let _ = writer.send(close).await;
}

/// Send middleware, then serialize and write. Only transport failures are
/// returned.
async fn write_event<W>(
    state: &HubState,
    id: &ConnectionId,
    request: &ConnectRequest,
    writer: &mut W,
    event: Event,
) -> Result<(), String>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let event = match state.send_middleware.run(event, request) {
        Ok(event) => event,
        Err(rejected) => {
            debug!(conn_id = %id, error = %rejected.error, "send middleware rejected event");
            state.metrics.counter_inc("hub.events.rejected", &[("stage", "send_middleware")], 1);
            (state.config.error_handler)(&rejected.original, &rejected.error)
        }
    };

    if event.dest == Target::None {
        trace!(conn_id = %id, event_type = %event.event_type, "dropping event addressed to none");
        return Ok(());
    }

    let text = match (state.config.serializer)(&event.event_type, &event.payload, request) {
        Ok(text) => text,
        Err(err) => {
            warn!(conn_id = %id, event_type = %event.event_type, error = %err, "failed to serialize event");
            state.metrics.counter_inc("hub.events.rejected", &[("stage", "serialization")], 1);
            format!("failed to serialize event: {err}")
        }
    };

    trace!(conn_id = %id, event_type = %event.event_type, "sending");
    writer
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}
