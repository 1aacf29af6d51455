//! Connection registry for inbound WebSocket legs.
//!
//! Holds at most one live connection per [`ConnectionRole`]. A connection is
//! represented by a [`ConnectionHandle`]: an id, a channel into the socket's
//! writer task and a cancellation token that closes the socket.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Outbound queue depth per connection.
pub const CONNECTION_CHANNEL_CAPACITY: usize = 256;

/// Role a WebSocket plays in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// The carrier's media stream.
    Media,
    /// A monitoring client receiving the speech event mirror.
    Observer,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Media => write!(f, "media"),
            ConnectionRole::Observer => write!(f, "observer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection {0} is closed")]
    Closed(Uuid),

    #[error("Outbound queue for connection {0} is full")]
    Full(Uuid),

    #[error("Failed to serialize outbound message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handle to one accepted WebSocket.
///
/// Cloning yields another handle to the same socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    role: ConnectionRole,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer task drains.
    pub fn new(role: ConnectionRole) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CONNECTION_CHANNEL_CAPACITY);
        let handle = Self {
            id: Uuid::new_v4(),
            role,
            tx,
            cancel: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Token cancelled when the connection is closed from this side.
    pub fn closed_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Queue a text frame.
    pub async fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        if self.cancel.is_cancelled() {
            return Err(ConnectionError::Closed(self.id));
        }
        self.tx
            .send(text)
            .await
            .map_err(|_| ConnectionError::Closed(self.id))
    }

    /// Serialize and queue a JSON frame.
    pub async fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ConnectionError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text).await
    }

    /// Queue a text frame without waiting for room in the channel.
    pub fn try_send_text(&self, text: String) -> Result<(), ConnectionError> {
        if self.cancel.is_cancelled() {
            return Err(ConnectionError::Closed(self.id));
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed(self.id),
        })
    }

    /// Serialize and queue a JSON frame, failing fast when the queue is full.
    pub fn try_send_json<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ConnectionError> {
        let text = serde_json::to_string(message)?;
        self.try_send_text(text)
    }

    /// Ask the writer task to close the socket. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(connection_id = %self.id, role = %self.role, "Closing connection");
            self.cancel.cancel();
        }
    }

    fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.id == other.id
    }
}

/// Single-occupancy map from role to live connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionRole, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, closing and evicting any previous one of the same role.
    pub fn accept(&self, handle: ConnectionHandle) {
        let role = handle.role();
        let id = handle.id();
        let previous = self.connections.lock().insert(role, handle);
        if let Some(previous) = previous {
            tracing::info!(
                role = %role,
                connection_id = %previous.id(),
                "Evicting previous connection"
            );
            previous.close();
        }
        tracing::info!(role = %role, connection_id = %id, "Connection accepted");
    }

    /// Forget a connection. Unknown or already released handles are ignored.
    pub fn release(&self, handle: &ConnectionHandle) -> bool {
        {
            let mut connections = self.connections.lock();
            let is_current = connections
                .get(&handle.role())
                .is_some_and(|current| current.same_connection(handle));
            if !is_current {
                return false;
            }
            connections.remove(&handle.role());
        }
        tracing::info!(
            role = %handle.role(),
            connection_id = %handle.id(),
            "Connection released"
        );
        true
    }

    /// Send to one connection; a failed send releases it.
    pub async fn send_to(&self, handle: &ConnectionHandle, message: String) -> bool {
        let result = handle.send_text(message).await;
        self.settle(handle, result)
    }

    /// Serialize and send to one connection, waiting for queue space.
    pub async fn send_json_to<T: Serialize + ?Sized>(
        &self,
        handle: &ConnectionHandle,
        message: &T,
    ) -> bool {
        let result = handle.send_json(message).await;
        self.settle(handle, result)
    }

    /// Best-effort variant of [`send_json_to`](Self::send_json_to).
    ///
    /// A full queue drops the message and keeps the connection.
    pub fn try_send_json_to<T: Serialize + ?Sized>(
        &self,
        handle: &ConnectionHandle,
        message: &T,
    ) -> bool {
        let result = handle.try_send_json(message);
        self.settle(handle, result)
    }

    fn settle(&self, handle: &ConnectionHandle, result: Result<(), ConnectionError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e @ ConnectionError::Closed(_)) => {
                tracing::warn!(connection_id = %handle.id(), "Send failed: {}", e);
                self.release(handle);
                false
            }
            Err(e) => {
                tracing::warn!(connection_id = %handle.id(), "Dropping outbound message: {}", e);
                false
            }
        }
    }

    /// Send to every connection of a role, evicting any that fail.
    ///
    /// Returns how many connections received the message.
    pub async fn broadcast(&self, role: ConnectionRole, message: String) -> usize {
        let targets: Vec<ConnectionHandle> = self
            .connections
            .lock()
            .get(&role)
            .cloned()
            .into_iter()
            .collect();

        let mut delivered = 0;
        for handle in targets {
            if self.send_to(&handle, message.clone()).await {
                delivered += 1;
            } else {
                handle.close();
            }
        }
        delivered
    }

    /// Number of live connections for a role (0 or 1).
    pub fn count(&self, role: ConnectionRole) -> usize {
        usize::from(self.connections.lock().contains_key(&role))
    }

    /// The live connection for a role, if any.
    pub fn active(&self, role: ConnectionRole) -> Option<ConnectionHandle> {
        self.connections.lock().get(&role).cloned()
    }
}
