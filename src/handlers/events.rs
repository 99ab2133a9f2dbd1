//! Inspection event stream (SSE)
//!
//! The streaming acknowledgment's `streamUrl` points here. Subscribers get
//! the lifecycle events (PROCESSING, COMPLETE, FAILED) for one inspection id;
//! events for other inspections are filtered out server-side.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::StreamExt;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::state::AppState;

/// GET /api/inspections/{id}/events - lifecycle events for one inspection
pub async fn inspection_events_sse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.pipeline.subscribe();
    let stream = BroadcastStream::new(receiver);

    let event_stream = stream.filter_map(move |result| async move {
        match result {
            Ok(event) if event.inspection_id == id => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(&event.event_type).data(data)))
            }
            // Other inspections' events and lagged-receiver errors are dropped
            _ => None,
        }
    });

    Sse::new(event_stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("heartbeat"),
    )
}
