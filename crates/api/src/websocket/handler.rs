//! WebSocket handler for Axum
//!
//! Upgrades the connection, pumps outbound events from the connection's queue
//! to the socket, and routes inbound events to the room session coordinator.

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;

use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
    session::{RoomSessions, SessionError},
};

/// Protocol-level ceiling relative to the configured event limit. Frames
/// between the two are read and answered with an `error` event; larger ones
/// are refused by the WebSocket layer itself.
const PROTOCOL_LIMIT_FACTOR: usize = 4;

/// WebSocket handler - upgrades HTTP connection to WebSocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    let max_message_bytes = app_state.config.ws_max_message_bytes;
    tracing::debug!("WebSocket connection upgrade requested");

    ws.max_message_size(protocol_limit(max_message_bytes))
        .on_upgrade(move |socket| handle_socket(socket, app_state.sessions, max_message_bytes))
}

fn protocol_limit(max_message_bytes: usize) -> usize {
    max_message_bytes.saturating_mul(PROTOCOL_LIMIT_FACTOR)
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, sessions: RoomSessions, max_message_bytes: usize) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = sessions.connect(tx).await;
    let connection_id = conn.id;

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = ?e, connection_id = %connection_id, "WebSocket receive error");
                break;
            }
        };

        if handle_frame(msg, &conn, &sessions, max_message_bytes).await.is_break() {
            break;
        }
    }

    // Cleanup on disconnect
    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    sessions.disconnect(connection_id).await;

    send_task.abort();
}

/// Handle one inbound frame. Breaks only when the client closed the socket.
async fn handle_frame(
    msg: Message,
    conn: &Arc<Connection>,
    sessions: &RoomSessions,
    max_message_bytes: usize,
) -> ControlFlow<()> {
    match msg {
        Message::Text(text) => {
            if text.len() > max_message_bytes {
                tracing::warn!(
                    connection_id = %conn.id,
                    size = text.len(),
                    limit = max_message_bytes,
                    "Rejected oversized WebSocket frame"
                );
                send_error(conn, "Message too large");
                return ControlFlow::Continue(());
            }

            match parse_client_event(&text) {
                Ok(event) => handle_client_event(event, conn, sessions).await,
                Err(reason) => {
                    tracing::warn!(
                        connection_id = %conn.id,
                        reason = %reason,
                        "Rejected client event"
                    );
                    send_error(conn, &reason);
                }
            }
            ControlFlow::Continue(())
        }
        Message::Close(_) => {
            tracing::info!(connection_id = %conn.id, "WebSocket close frame received");
            ControlFlow::Break(())
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum handles ping/pong automatically
            ControlFlow::Continue(())
        }
        Message::Binary(_) => {
            send_error(conn, "Binary frames are not supported");
            ControlFlow::Continue(())
        }
    }
}

/// Parse and validate an inbound frame before it reaches the coordinator
fn parse_client_event(text: &str) -> Result<ClientEvent, String> {
    let event = serde_json::from_str::<ClientEvent>(text).map_err(|e| format!("Invalid event format: {e}"))?;
    event.validate().map_err(str::to_string)?;
    Ok(event)
}

/// Handle client event
async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, sessions: &RoomSessions) {
    let kind = event.kind();

    let result: Result<(), SessionError> = match event {
        ClientEvent::JoinRoom {
            room_id,
            user_id,
            reconnect_hint,
        } => sessions
            .join(conn, room_id, user_id, reconnect_hint)
            .await
            .map(|_| ()),

        ClientEvent::LeaveRoom { room_id } => sessions.leave(conn, room_id).await.map(|_| ()),

        ClientEvent::SendMessage {
            room_id,
            user_id,
            message,
        } => sessions
            .send_message(conn, room_id, user_id, &message)
            .await
            .map(|_| ()),

        ClientEvent::Ping => {
            if conn.send(ServerEvent::Pong).is_err() {
                tracing::warn!(connection_id = %conn.id, "Failed to send pong");
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!(
            error = %e,
            connection_id = %conn.id,
            event_type = kind,
            "Client event failed"
        );
        send_error(conn, &client_message(&e));
    }
}

/// Error text shown to the client; storage details stay in the logs
fn client_message(err: &SessionError) -> String {
    match err {
        SessionError::UserNotFound(user_id) => format!("User not found: {user_id}"),
        SessionError::Persistence(_) => "Failed to process event".to_string(),
    }
}

fn send_error(conn: &Connection, message: &str) {
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    if conn.send(event).is_err() {
        tracing::warn!(connection_id = %conn.id, "Failed to send error event");
    }
}
