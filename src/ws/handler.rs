//! WebSocket upgrade handlers for the default channel and room channels

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::room::{Envelope, RoomEvent, RoomHandle};
use crate::ws::protocol::{RoomMsg, RouterMsg, ServerMsg};

/// Upgrade handler for the default channel
pub async fn lobby_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, state))
}

/// Upgrade handler for a room's dedicated channel
pub async fn room_ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_room_socket(socket, room_id, state))
}

async fn handle_lobby_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New lobby connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    if let Err(e) = send_msg(&mut ws_sink, &state.router.greeting()).await {
        error!(conn_id = %conn_id, error = %e, "Failed to send namespace");
        return;
    }

    while let Some(msg) = next_message::<RouterMsg>(conn_id, &mut ws_stream).await {
        let reply = state.router.handle(conn_id, msg);
        if let Err(e) = send_msg(&mut ws_sink, &reply).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }

    info!(conn_id = %conn_id, "Lobby connection closed");
}

async fn handle_room_socket(socket: WebSocket, room_id: String, state: AppState) {
    let conn_id = Uuid::new_v4();

    // Stale clients of a destroyed room get nothing back
    let Some(room) = Uuid::parse_str(&room_id)
        .ok()
        .and_then(|id| state.rooms.get(&id))
    else {
        info!(conn_id = %conn_id, room_id = %room_id, "Connection for unknown room, closing");
        return;
    };

    info!(conn_id = %conn_id, room_id = %room.id, "New room connection");

    // Subscribe before announcing the connection so no reply is missed
    let room_rx = room.subscribe();
    if room.send(conn_id, RoomEvent::Connected).await.is_err() {
        debug!(conn_id = %conn_id, room_id = %room.id, "Room closed before attach");
        return;
    }

    let (ws_sink, ws_stream) = socket.split();
    let writer_handle = tokio::spawn(forward_room_messages(conn_id, room_rx, ws_sink));

    run_room_reader(conn_id, &room, ws_stream).await;

    if let Err(e) = room.send(conn_id, RoomEvent::Disconnected).await {
        debug!(conn_id = %conn_id, error = %e, "Disconnect not delivered");
    }

    writer_handle.abort();

    info!(conn_id = %conn_id, room_id = %room.id, "Room connection closed");
}

/// Reader loop: WebSocket -> room task
async fn run_room_reader(conn_id: Uuid, room: &RoomHandle, mut ws_stream: SplitStream<WebSocket>) {
    while let Some(msg) = next_message::<RoomMsg>(conn_id, &mut ws_stream).await {
        if let Err(e) = room.send(conn_id, RoomEvent::Message(msg)).await {
            debug!(conn_id = %conn_id, error = %e, "Room input closed");
            break;
        }
    }
}

/// Writer task: room broadcasts addressed to this connection -> WebSocket
async fn forward_room_messages(
    conn_id: Uuid,
    mut room_rx: broadcast::Receiver<Envelope>,
    mut ws_sink: SplitSink<WebSocket, Message>,
) {
    loop {
        match room_rx.recv().await {
            Ok(envelope) => {
                if !envelope.is_for(conn_id) {
                    continue;
                }
                if let Err(e) = send_msg(&mut ws_sink, &envelope.msg).await {
                    debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(
                    conn_id = %conn_id,
                    lagged_count = n,
                    "Client lagged, skipping {} room messages", n
                );
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(conn_id = %conn_id, "Room channel closed");
                break;
            }
        }
    }
}

/// Next decodable text frame. `None` once the connection is gone.
async fn next_message<T: DeserializeOwned>(
    conn_id: Uuid,
    ws_stream: &mut SplitStream<WebSocket>,
) -> Option<T> {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<T>(&text) {
                Ok(msg) => return Some(msg),
                Err(e) => {
                    warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client initiated close");
                return None;
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                return None;
            }
        }
    }
    None
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
