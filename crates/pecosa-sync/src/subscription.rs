// File: pecosa-sync/src/subscription.rs
// Purpose: Realtime subscription keeping a mirror list in step with a change feed

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::feed::{ChangeFeed, FeedEvent};
use crate::filter::EqFilter;
use crate::mirror::{MirrorList, MirrorOp, SortDirection, SortSpec};
use crate::record::{Record, RecordKey};

/// Default coalescing window for snapshot publication
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

type RowCallback<R> = Arc<dyn Fn(&R) + Send + Sync>;
type KeyCallback = Arc<dyn Fn(&RecordKey) + Send + Sync>;

/// Options for [`Subscription::open`]
pub struct SubscriptionOptions<R> {
    pub filter: Option<EqFilter>,
    pub order_by: Option<String>,
    pub order_direction: SortDirection,
    pub limit: Option<usize>,
    pub debounce: Duration,
    on_insert: Option<RowCallback<R>>,
    on_update: Option<RowCallback<R>>,
    on_delete: Option<KeyCallback>,
}

impl<R> Default for SubscriptionOptions<R> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: None,
            order_direction: SortDirection::default(),
            limit: None,
            debounce: DEFAULT_DEBOUNCE,
            on_insert: None,
            on_update: None,
            on_delete: None,
        }
    }
}

impl<R> SubscriptionOptions<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only receive rows where `column == value`
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter = Some(EqFilter::new(column, value));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(column.into());
        self.order_direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn on_insert(mut self, f: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(f));
        self
    }

    pub fn on_update(mut self, f: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    pub fn on_delete(mut self, f: impl Fn(&RecordKey) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Arc::new(f));
        self
    }

    fn sort_spec(&self) -> Option<SortSpec> {
        self.order_by
            .as_ref()
            .map(|column| SortSpec::new(column.clone(), self.order_direction))
    }
}

/// Published view of a subscription
#[derive(Debug, Clone)]
pub struct SubscriptionState<R> {
    /// Mirror content, capped to `limit`
    pub data: Vec<R>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

enum Command<R> {
    SetData(Vec<R>),
    Apply(MirrorOp<R>),
}

/// Live subscription to one table.
///
/// The mirror is owned by a spawned task; dropping the handle aborts it,
/// which cancels any pending flush and releases the feed.
pub struct Subscription<R> {
    table: String,
    state_rx: watch::Receiver<SubscriptionState<R>>,
    commands: mpsc::UnboundedSender<Command<R>>,
    task: JoinHandle<()>,
}

impl<R: Record> Subscription<R> {
    /// Start mirroring `table` from `feed`. Must be called inside a Tokio runtime.
    pub fn open(
        table: impl Into<String>,
        initial: Vec<R>,
        feed: ChangeFeed,
        options: SubscriptionOptions<R>,
    ) -> Self {
        let table = table.into();
        let mirror = MirrorList::new(initial, options.sort_spec());

        let (state_tx, state_rx) = watch::channel(SubscriptionState {
            data: mirror.view(options.limit),
            is_loading: true,
            error: None,
            last_updated: None,
        });
        let (commands, command_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            table: table.clone(),
            mirror,
            options,
            state_tx,
            is_loading: true,
            error: None,
            last_updated: None,
        };
        let task = tokio::spawn(worker.run(feed, command_rx));

        Self {
            table,
            state_rx,
            commands,
            task,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current published state
    pub fn snapshot(&self) -> SubscriptionState<R> {
        self.state_rx.borrow().clone()
    }

    pub fn data(&self) -> Vec<R> {
        self.state_rx.borrow().data.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state_rx.borrow().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.state_rx.borrow().error.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state_rx.borrow().last_updated
    }

    /// Wait for the next published state. Returns `false` once the subscription task is gone.
    pub async fn changed(&mut self) -> bool {
        self.state_rx.changed().await.is_ok()
    }

    /// A receiver for callers that want to watch the state themselves
    pub fn watch(&self) -> watch::Receiver<SubscriptionState<R>> {
        self.state_rx.clone()
    }

    /// Replace the mirror content (the owner's direct setter)
    pub fn set_data(&self, rows: Vec<R>) {
        if self.commands.send(Command::SetData(rows)).is_err() {
            tracing::warn!(table = %self.table, "set_data on a closed subscription");
        }
    }

    /// Apply a local CRUD result to the mirror without waiting for the feed
    pub fn apply(&self, op: MirrorOp<R>) {
        if self.commands.send(Command::Apply(op)).is_err() {
            tracing::warn!(table = %self.table, "apply on a closed subscription");
        }
    }

    /// Release the feed now instead of at drop
    pub fn unsubscribe(self) {}
}

impl<R> Drop for Subscription<R> {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(table = %self.table, "subscription released");
    }
}

struct Worker<R> {
    table: String,
    mirror: MirrorList<R>,
    options: SubscriptionOptions<R>,
    state_tx: watch::Sender<SubscriptionState<R>>,
    is_loading: bool,
    error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl<R: Record> Worker<R> {
    async fn run(mut self, mut feed: ChangeFeed, mut commands: mpsc::UnboundedReceiver<Command<R>>) {
        let mut flush_at: Option<Instant> = None;
        let mut feed_open = true;

        loop {
            let deadline = flush_at;
            let flush = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = feed.next(), if feed_open => match event {
                    Some(FeedEvent::Subscribed) => {
                        tracing::info!(table = %self.table, "subscription status: subscribed");
                        self.is_loading = false;
                        self.publish();
                    }
                    Some(FeedEvent::Change(change)) => {
                        if change.table != self.table {
                            continue;
                        }
                        if let Some(filter) = &self.options.filter {
                            if !filter.matches_event(&change) {
                                continue;
                            }
                        }
                        if let Some(op) = MirrorOp::from_event(&change) {
                            self.handle_op(op);
                            // Trailing debounce: every event pushes the flush out
                            flush_at = Some(Instant::now() + self.options.debounce);
                        }
                    }
                    Some(FeedEvent::Error(message)) => {
                        tracing::warn!(table = %self.table, "subscription status: {}", message);
                        self.error = Some(message);
                        self.publish();
                    }
                    None => {
                        tracing::info!(table = %self.table, "subscription status: closed");
                        feed_open = false;
                        if flush_at.take().is_some() {
                            self.publish();
                        }
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::SetData(rows)) => {
                        self.mirror.replace(rows);
                        self.publish();
                    }
                    Some(Command::Apply(op)) => {
                        self.mirror.apply(op);
                        self.publish();
                    }
                    None => break,
                },
                _ = flush => {
                    flush_at = None;
                    self.publish();
                }
            }
        }
    }

    fn handle_op(&mut self, op: MirrorOp<R>) {
        match op {
            MirrorOp::Insert(row) => {
                self.mirror.apply(MirrorOp::Insert(row.clone()));
                if let Some(callback) = &self.options.on_insert {
                    callback(&row);
                }
            }
            MirrorOp::Update(row) => {
                self.mirror.apply(MirrorOp::Update(row.clone()));
                if let Some(callback) = &self.options.on_update {
                    callback(&row);
                }
            }
            MirrorOp::Delete(key) => {
                self.mirror.apply(MirrorOp::Delete(key.clone()));
                if let Some(callback) = &self.options.on_delete {
                    callback(&key);
                }
            }
        }
        self.last_updated = Some(Utc::now());
    }

    fn publish(&self) {
        self.state_tx.send_replace(SubscriptionState {
            data: self.mirror.view(self.options.limit),
            is_loading: self.is_loading,
            error: self.error.clone(),
            last_updated: self.last_updated,
        });
    }
}
