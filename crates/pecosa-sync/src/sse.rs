// File: pecosa-sync/src/sse.rs
// Purpose: Server-Sent Events feed for one table

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;

use crate::engine::SyncState;
use crate::error::{Result, SyncError};
use crate::feed::{broadcast_feed, scoped, FeedEvent};
use crate::filter::EqFilter;

/// Query parameters for the realtime feed
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeQuery {
    /// `column=value` equality filter
    pub filter: Option<String>,
}

/// Handler for GET /api/realtime/:table
pub async fn realtime_events_handler(
    State(state): State<SyncState>,
    Path(table): Path<String>,
    Query(query): Query<RealtimeQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    state.ensure_table(&table)?;

    let filter = match query.filter.as_deref() {
        Some(raw) => Some(
            EqFilter::parse(raw)
                .ok_or_else(|| SyncError::InvalidChange(format!("invalid filter '{}'", raw)))?,
        ),
        None => None,
    };

    tracing::debug!(table, ?filter, "SSE subscriber connected");
    let feed = scoped(broadcast_feed(state.tracker.subscribe()), table, filter);

    Ok(Sse::new(feed.filter_map(|event| async move { to_sse(event).map(Ok) }))
        .keep_alive(KeepAlive::default()))
}

fn to_sse(event: FeedEvent) -> Option<Event> {
    match event {
        FeedEvent::Subscribed => Some(Event::default().event("subscribed").data("{}")),
        FeedEvent::Change(change) => Event::default().event("change").json_data(&change).ok(),
        FeedEvent::Error(message) => Some(Event::default().event("error").data(message)),
    }
}
