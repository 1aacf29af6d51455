//! Media leg dispatcher (`/ws/call`).
//!
//! Every text frame from the carrier is parsed as a [`MediaEvent`] and handed
//! to the session bridge in arrival order.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::socket::spawn_writer;
use crate::core::registry::{ConnectionHandle, ConnectionRole};
use crate::core::telephony::MediaEvent;
use crate::state::AppState;

pub async fn call_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_call_socket(socket, state))
}

async fn handle_call_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let (handle, rx) = ConnectionHandle::new(ConnectionRole::Media);
    let writer = spawn_writer(sender, rx, handle.clone());
    let closed = handle.closed_token();

    state.registry.accept(handle.clone());
    state.bridge.attach_media(handle.clone());
    info!(connection_id = %handle.id(), "Media connection established");

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                debug!(connection_id = %handle.id(), "Media connection closed by server");
                break;
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match MediaEvent::parse(text.as_str()) {
                    Ok(event) => state.bridge.on_media_event(event).await,
                    Err(e) => warn!(connection_id = %handle.id(), "Ignoring malformed media frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!(connection_id = %handle.id(), "Media connection closed by carrier");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection_id = %handle.id(), "Media WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    state.registry.release(&handle);
    state.bridge.on_media_closed(&handle).await;
    handle.close();
    let _ = writer.await;
}
