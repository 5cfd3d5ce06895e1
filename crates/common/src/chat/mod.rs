//! Presence and chat room
//!
//! In-memory fan-out of chat messages and online-user snapshots to every
//! connected client. The room is an explicit publish/subscribe structure
//! keyed by connection id, independent of the WebSocket transport, so
//! broadcast behavior is testable without a socket.
//!
//! All room operations run under one async mutex, which is what gives the
//! server its total broadcast order: events are fanned out in the order
//! the room processes them. Delivery to a slow client is at-most-once; a
//! full outbound queue drops that client's event rather than stalling the
//! room.

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{ChatMessage, PresenceEntry, ProfileSnapshot};
use crate::store::ChatHistoryStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifier of one connected client
pub type ConnectionId = Uuid;

/// Events sent from the server to connected clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Full message history, delivered once on connect
    #[serde(rename = "chatHistory")]
    ChatHistory { messages: Vec<ChatMessage> },

    /// One broadcast chat message
    #[serde(rename = "message")]
    Message { message: ChatMessage },

    /// Full snapshot of online users, broadcast on join/leave
    #[serde(rename = "userList")]
    UserList { users: Vec<PresenceEntry> },
}

/// Events received from clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join {
        identity: String,
        #[serde(default)]
        profile: ProfileSnapshot,
    },

    #[serde(rename = "message")]
    Message { text: String },
}

struct Connection {
    tx: mpsc::Sender<ServerEvent>,
    /// Set by `join`; a connection that never joins cannot send
    joined: Option<PresenceEntry>,
}

#[derive(Default)]
struct RoomState {
    connections: HashMap<ConnectionId, Connection>,
}

impl RoomState {
    fn user_list(&self) -> Vec<PresenceEntry> {
        self.connections
            .values()
            .filter_map(|c| c.joined.clone())
            .collect()
    }

    /// Queue an event for every connection. A full or closed queue drops
    /// the event for that client only.
    fn broadcast(&self, event: ServerEvent) {
        for (id, connection) in &self.connections {
            if connection.tx.try_send(event.clone()).is_err() {
                debug!(connection = %id, "Dropped event for slow or closed client");
            }
        }
    }
}

/// The single chat room shared by all portal clients
#[derive(Clone)]
pub struct ChatRoom {
    state: Arc<Mutex<RoomState>>,
    history: Arc<ChatHistoryStore>,
}

impl ChatRoom {
    pub fn new(history: Arc<ChatHistoryStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RoomState::default())),
            history,
        }
    }

    /// Register a connection and deliver the full message history to it.
    /// History is unbounded by design; the source never paginated it.
    pub async fn connect(&self, tx: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().await;

        let messages = match self.history.load().await {
            Ok(doc) => doc.messages,
            Err(e) => {
                error!(error = %e, "Failed to load chat history, sending empty");
                Vec::new()
            }
        };

        if tx.try_send(ServerEvent::ChatHistory { messages }).is_err() {
            debug!(connection = %id, "Client gone before history delivery");
        }

        state.connections.insert(
            id,
            Connection {
                tx,
                joined: None,
            },
        );
        metrics::record_chat_connections(state.connections.len());

        debug!(connection = %id, "Chat client connected");
        id
    }

    /// Mark a connection as joined and broadcast the updated user list to
    /// every connected client, not just the joiner.
    pub async fn join(&self, id: ConnectionId, identity: &str, profile: ProfileSnapshot) {
        let mut state = self.state.lock().await;

        let Some(connection) = state.connections.get_mut(&id) else {
            warn!(connection = %id, "Join from unknown connection");
            return;
        };
        connection.joined = Some(PresenceEntry {
            identity: identity.to_string(),
            profile,
        });

        info!(connection = %id, identity = %identity, "Chat client joined");
        let users = state.user_list();
        state.broadcast(ServerEvent::UserList { users });
    }

    /// Persist and broadcast one message. The sender's identity and
    /// profile snapshot come from the presence map; a connection that
    /// never joined gets `NotJoined` and nothing is broadcast.
    pub async fn send(&self, id: ConnectionId, text: &str) -> Result<ChatMessage> {
        let state = self.state.lock().await;

        let presence = state
            .connections
            .get(&id)
            .and_then(|c| c.joined.clone())
            .ok_or_else(|| {
                warn!(connection = %id, "Dropping message from connection that never joined");
                AppError::NotJoined {
                    connection: id.to_string(),
                }
            })?;

        let message = ChatMessage {
            user: presence.identity,
            text: text.to_string(),
            time: Utc::now(),
            profile: presence.profile,
        };

        // Persistence and broadcast are separate steps: a failed write is
        // logged and the message still goes out.
        if let Err(e) = self.history.append(message.clone()).await {
            error!(error = %e, "Failed to persist chat message");
        }

        state.broadcast(ServerEvent::Message {
            message: message.clone(),
        });
        metrics::record_chat_message();

        Ok(message)
    }

    /// Drop a connection, snapshot the remaining users into the chat
    /// document, and broadcast the updated user list.
    pub async fn leave(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;

        if state.connections.remove(&id).is_none() {
            return;
        }
        metrics::record_chat_connections(state.connections.len());
        debug!(connection = %id, "Chat client disconnected");

        let users = state.user_list();
        if let Err(e) = self.history.snapshot_users(users.clone()).await {
            error!(error = %e, "Failed to snapshot chat users");
        }
        state.broadcast(ServerEvent::UserList { users });
    }

    /// Current online users (joined connections only)
    pub async fn user_list(&self) -> Vec<PresenceEntry> {
        self.state.lock().await.user_list()
    }
}
