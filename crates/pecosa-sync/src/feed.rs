// File: pecosa-sync/src/feed.rs
// Purpose: Change feed sources consumed by realtime subscriptions

use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::change_tracker::ChangeEvent;
use crate::filter::EqFilter;

/// What a change feed reports to its subscription
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The feed is live; initial loading is over
    Subscribed,
    /// A row-level change
    Change(ChangeEvent),
    /// A non-fatal feed problem (lag, failed poll). Logged, never retried.
    Error(String),
}

/// Boxed feed stream, the seam between feed sources and subscriptions
pub type ChangeFeed = Pin<Box<dyn Stream<Item = FeedEvent> + Send>>;

/// Feed backed by the in-process change tracker broadcast
pub fn broadcast_feed(rx: broadcast::Receiver<ChangeEvent>) -> ChangeFeed {
    let changes = BroadcastStream::new(rx).map(|result| match result {
        Ok(change) => FeedEvent::Change(change),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            FeedEvent::Error(format!("change feed lagged, {} events skipped", skipped))
        }
    });

    Box::pin(stream::once(async { FeedEvent::Subscribed }).chain(changes))
}

/// Feed from any stream of change events, e.g. a test channel
pub fn from_changes<S>(changes: S) -> ChangeFeed
where
    S: Stream<Item = ChangeEvent> + Send + 'static,
{
    Box::pin(stream::once(async { FeedEvent::Subscribed }).chain(changes.map(FeedEvent::Change)))
}

/// Narrow a feed to one table and an optional equality filter.
/// Non-change events pass through untouched.
pub fn scoped(feed: ChangeFeed, table: String, filter: Option<EqFilter>) -> ChangeFeed {
    Box::pin(feed.filter(move |event| {
        let keep = match event {
            FeedEvent::Change(change) => {
                change.table == table && filter.as_ref().map_or(true, |f| f.matches_event(change))
            }
            _ => true,
        };
        futures::future::ready(keep)
    }))
}
