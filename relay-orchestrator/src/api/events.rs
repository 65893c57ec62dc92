//! Job update stream
//!
//! Server-Sent Events carrying the caller's `JobEvent`s as they happen.
//! Delivery is best-effort: a client that falls behind skips events rather
//! than slowing anything down.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::api::AppState;
use crate::api::owner::OwnerId;

/// GET /api/jobs/events
pub async fn stream_events(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("Opening event stream for owner {}", owner_id);

    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(move |msg| match msg {
        Ok(event) if event.owner_id == owner_id => {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(Event::default().event("job_update").data(data)))
        }
        // Not ours, or skipped after lagging
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
