use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive},
        Json, Sse,
    },
};
use planboard_core::{board_topic, BroadcastHub, ChangeRecord};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::{Stream, StreamExt};

use super::{api_error, log_api_issue, ApiError, ErrorResponse};
use crate::state::AppState;

/// Unregisters an SSE connection when its stream is dropped.
struct SubscriptionGuard {
    hub: Arc<BroadcastHub>,
    topic: String,
    connection_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unregister(&self.topic, self.connection_id);
    }
}

fn change_event(record: &ChangeRecord) -> Option<Event> {
    let json = serde_json::to_string(record).ok()?;
    Some(
        Event::default()
            .event(record.event.kind())
            .id(record.version.to_string())
            .data(json),
    )
}

/// SSE endpoint: a `snapshot` event with the current board, then one event per
/// committed change, named after the change kind.
pub async fn sse_events(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    const TARGET: &str = "planboard.api.events";
    let topic = board_topic(&board_id);
    // subscribe before reading so nothing committed in between is missed
    let subscription = state.hub.subscribe(&topic).map_err(|e| {
        let status = axum::http::StatusCode::SERVICE_UNAVAILABLE;
        log_api_issue(status, TARGET, e.to_string());
        (status, Json(ErrorResponse { error: e.to_string() }))
    })?;
    let guard = SubscriptionGuard {
        hub: state.hub.clone(),
        topic,
        connection_id: subscription.connection_id,
    };

    let board = state
        .engine
        .get_board(&board_id)
        .map_err(|e| api_error(TARGET, e))?;
    let snapshot = Event::default()
        .event("snapshot")
        .id(board.version.to_string())
        .data(serde_json::to_string(&board).unwrap_or_default());
    let snapshot_version = board.version;

    log::debug!(
        target: TARGET,
        "SSE connection {} opened on board {}",
        guard.connection_id,
        board_id
    );

    let stream = board_stream(snapshot, snapshot_version, subscription.receiver, guard);
    // keep-alive comments stop once the stream ends (board deleted)
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}

/// The snapshot, then every change newer than it. Ends when the topic is
/// closed; the guard lives as long as the stream.
fn board_stream(
    snapshot: Event,
    snapshot_version: u64,
    receiver: mpsc::UnboundedReceiver<Arc<ChangeRecord>>,
    guard: SubscriptionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let changes = UnboundedReceiverStream::new(receiver).filter_map(move |record| {
        let _keep = &guard;
        if record.version <= snapshot_version {
            return None;
        }
        change_event(&record).map(Ok)
    });
    tokio_stream::once(Ok::<Event, Infallible>(snapshot)).chain(changes)
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let boards = state.engine.list_boards(None).map(|b| b.len()).unwrap_or(0);
    Json(serde_json::json!({
        "status": "running",
        "port": state.port,
        "bind_address": state.bind_address,
        "boards": boards,
    }))
}

pub async fn list_logs() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "entries": crate::log_bridge::recent_entries(),
    }))
}

pub async fn stream_logs() -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = crate::log_bridge::subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| {
        let entry = item.ok()?;
        let payload = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(payload)))
    });
    Sse::new(stream)
}
