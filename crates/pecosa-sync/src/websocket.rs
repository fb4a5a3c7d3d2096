// File: pecosa-sync/src/websocket.rs
// Purpose: WebSocket realtime feed with per-table subscriptions and pushes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::change_tracker::ChangeEvent;
use crate::conflict::Conflict;
use crate::engine::SyncState;
use crate::filter::EqFilter;
use crate::queue::PendingChange;
use crate::sync_api::{push_changes, PushActor, SyncPushRequest};

/// WebSocket message types for the realtime protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    /// Client subscribes to a table, optionally filtered
    Subscribe {
        table: String,
        #[serde(default)]
        filter: Option<EqFilter>,
    },
    /// Client stops following a table
    Unsubscribe { table: String },
    /// Server confirms a subscription
    Subscribed { table: String },
    /// Server sends a change notification
    Change { change: ChangeEvent },
    /// Client pushes queued changes
    Push {
        table: String,
        #[serde(default)]
        client_id: Option<String>,
        changes: Vec<PendingChange>,
    },
    /// Server acknowledges a push
    PushAck {
        table: String,
        version: i64,
        applied: Vec<Uuid>,
        conflicts: Vec<Conflict>,
    },
    /// Error response
    Error { message: String },
    /// Heartbeat/ping
    Ping,
    /// Heartbeat/pong
    Pong,
}

/// Tables one connection may follow and push to.
///
/// The host's auth middleware attaches it as a request extension; without it
/// every synchronized table is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableAccess {
    pub readable: Vec<String>,
    pub writable: Vec<String>,
}

impl TableAccess {
    pub fn can_read(&self, table: &str) -> bool {
        self.readable.iter().any(|t| t == table)
    }

    pub fn can_write(&self, table: &str) -> bool {
        self.writable.iter().any(|t| t == table)
    }
}

/// Handler for GET /api/realtime/ws
pub async fn ws_realtime_handler(
    State(state): State<SyncState>,
    access: Option<Extension<TableAccess>>,
    actor: Option<Extension<PushActor>>,
    ws: WebSocketUpgrade,
) -> Response {
    let access = access.map(|Extension(access)| access);
    let actor = actor.map(|Extension(actor)| actor);
    ws.on_upgrade(|socket| handle_socket(socket, state, access, actor))
}

async fn handle_socket(
    socket: WebSocket,
    state: SyncState,
    access: Option<TableAccess>,
    actor: Option<PushActor>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut changes = state.tracker.subscribe();
    let mut subscriptions: HashMap<String, Option<EqFilter>> = HashMap::new();

    loop {
        let outgoing = tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket receive error: {}", e);
                        break;
                    }
                };
                match serde_json::from_str::<RealtimeMessage>(&text) {
                    Ok(message) => {
                        handle_client_message(message, &state, access.as_ref(), actor.as_ref(), &mut subscriptions)
                            .await
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse realtime message: {}", e);
                        vec![RealtimeMessage::Error { message: format!("invalid message: {}", e) }]
                    }
                }
            }
            change = changes.recv() => match change {
                Ok(change) => match subscriptions.get(&change.table) {
                    Some(filter) if filter.as_ref().map_or(true, |f| f.matches_event(&change)) => {
                        vec![RealtimeMessage::Change { change }]
                    }
                    _ => continue,
                },
                Err(RecvError::Lagged(skipped)) => vec![RealtimeMessage::Error {
                    message: format!("change feed lagged, {} events skipped", skipped),
                }],
                Err(RecvError::Closed) => break,
            },
        };

        for message in outgoing {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                tracing::debug!("WebSocket connection closed");
                return;
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}

fn denied(table: &str) -> Vec<RealtimeMessage> {
    vec![RealtimeMessage::Error {
        message: format!("not allowed on table '{}'", table),
    }]
}

async fn handle_client_message(
    message: RealtimeMessage,
    state: &SyncState,
    access: Option<&TableAccess>,
    actor: Option<&PushActor>,
    subscriptions: &mut HashMap<String, Option<EqFilter>>,
) -> Vec<RealtimeMessage> {
    match message {
        RealtimeMessage::Subscribe { table, filter } => {
            if let Err(e) = state.ensure_table(&table) {
                return vec![RealtimeMessage::Error { message: e.to_string() }];
            }
            if access.is_some_and(|a| !a.can_read(&table)) {
                return denied(&table);
            }
            tracing::debug!(table, ?filter, "WebSocket client subscribed");
            subscriptions.insert(table.clone(), filter);
            vec![RealtimeMessage::Subscribed { table }]
        }
        RealtimeMessage::Unsubscribe { table } => {
            subscriptions.remove(&table);
            Vec::new()
        }
        RealtimeMessage::Push { table, .. } if access.is_some_and(|a| !a.can_write(&table)) => {
            denied(&table)
        }
        RealtimeMessage::Push {
            table,
            client_id,
            changes,
        } => match push_changes(state, &table, SyncPushRequest { client_id, changes }, actor).await {
            Ok(response) => vec![RealtimeMessage::PushAck {
                table,
                version: response.version,
                applied: response.applied,
                conflicts: response.conflicts,
            }],
            Err(e) => vec![RealtimeMessage::Error { message: e.to_string() }],
        },
        RealtimeMessage::Ping => vec![RealtimeMessage::Pong],
        other => {
            tracing::warn!("Unexpected message from client: {:?}", other);
            vec![RealtimeMessage::Error {
                message: "unexpected message".to_string(),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_wire_format() {
        let msg: RealtimeMessage = serde_json::from_value(json!({
            "type": "subscribe",
            "table": "orders",
            "filter": {"column": "status", "value": "pendiente"}
        }))
        .unwrap();

        assert_eq!(
            msg,
            RealtimeMessage::Subscribe {
                table: "orders".to_string(),
                filter: Some(EqFilter::new("status", "pendiente")),
            }
        );
    }

    #[test]
    fn test_table_access() {
        let access = TableAccess {
            readable: vec!["orders".into(), "products".into()],
            writable: vec!["orders".into()],
        };
        assert!(access.can_read("products"));
        assert!(!access.can_write("products"));
        assert!(!access.can_read("customers"));
    }

    #[test]
    fn test_ack_wire_format() {
        let ack = RealtimeMessage::PushAck {
            table: "orders".to_string(),
            version: 4,
            applied: vec![],
            conflicts: vec![],
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["type"], "push_ack");
        assert_eq!(json["version"], 4);

        assert_eq!(serde_json::to_value(RealtimeMessage::Pong).unwrap(), json!({"type": "pong"}));
    }
}
