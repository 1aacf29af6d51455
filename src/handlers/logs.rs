//! Observer leg dispatcher (`/ws/logs`).
//!
//! The observer receives a mirror of every speech event and may push raw
//! speech-protocol messages (typically `session.update`) to the endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::StreamExt;
use serde_json::Value;
use tracing::{info, warn};

use super::socket::spawn_writer;
use crate::core::registry::{ConnectionHandle, ConnectionRole};
use crate::state::AppState;

pub async fn logs_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_logs_socket(socket, state))
}

async fn handle_logs_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let (handle, rx) = ConnectionHandle::new(ConnectionRole::Observer);
    let writer = spawn_writer(sender, rx, handle.clone());
    let closed = handle.closed_token();

    state.registry.accept(handle.clone());
    state.bridge.attach_observer(handle.clone());
    info!(connection_id = %handle.id(), "Observer connection established");

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(message) => state.bridge.on_observer_event(message).await,
                        Err(e) => warn!(connection_id = %handle.id(), "Ignoring malformed observer frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(connection_id = %handle.id(), "Observer connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection_id = %handle.id(), "Observer WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    state.registry.release(&handle);
    state.bridge.detach_observer(&handle);
    handle.close();
    let _ = writer.await;
}
