//! Chat WebSocket handler
//!
//! One bidirectional channel per client. Incoming frames carry `join` and
//! `message` events; the room pushes `chatHistory`, `message`, and
//! `userList` events back. Malformed or out-of-band events are logged and
//! dropped without disconnecting the client.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::AppState;
use civica_common::chat::{ChatRoom, ClientEvent, ServerEvent};

/// Upgrade to the chat channel
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.chat.clone()))
}

async fn handle_socket(socket: WebSocket, room: ChatRoom) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerEvent>(64);
    let connection = room.connect(tx).await;

    // Writer task: room events out to the socket
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(error = %e, "Failed to encode chat event"),
            }
        }
    });

    // Read loop: client events into the room
    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(ClientEvent::Join { identity, profile }) => {
                    room.join(connection, &identity, profile).await;
                }
                Ok(ClientEvent::Message { text }) => {
                    // A send before join is dropped; the client gets no
                    // error on the wire.
                    if let Err(e) = room.send(connection, &text).await {
                        debug!(connection = %connection, error = %e, "Chat send rejected");
                    }
                }
                Err(e) => {
                    debug!(connection = %connection, error = %e, "Ignoring malformed chat event");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    room.leave(connection).await;
    writer.abort();
}
