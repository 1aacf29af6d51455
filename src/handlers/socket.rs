//! Writer task shared by the media and observer dispatchers.

use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::registry::ConnectionHandle;

/// Drain `rx` into the socket until the handle is closed.
///
/// Frames already queued are flushed before the close frame goes out. A
/// failed write closes the handle so the reading side stops too.
pub(crate) fn spawn_writer(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    handle: ConnectionHandle,
) -> JoinHandle<()> {
    let closed = handle.closed_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                message = rx.recv() => {
                    let Some(text) = message else { break };
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        warn!(connection_id = %handle.id(), role = %handle.role(), "WebSocket write failed: {}", e);
                        handle.close();
                        return;
                    }
                }
                _ = closed.cancelled() => {
                    debug!(connection_id = %handle.id(), role = %handle.role(), "Sending close frame");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    })
}
