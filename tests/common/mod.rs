//! Shared helpers for integration tests: a test configuration and a local
//! WebSocket server standing in for the realtime speech endpoint.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_async, connect_async, tungstenite::Message,
};

use callbridge::{ReconnectionConfig, ServerConfig, routes, state::AppState};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Minimal configuration pointing the speech client at `realtime_url`.
pub fn test_config(realtime_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "https://bridge.example.com".to_string(),
        tls: None,
        openai_api_key: "sk-test".to_string(),
        openai_model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
        openai_realtime_url: realtime_url.to_string(),
        reconnect: ReconnectionConfig {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 200,
        },
        weather_api_url: "http://127.0.0.1:9/forecast".to_string(),
        cors_allowed_origins: None,
    }
}

/// Serve the full router on an ephemeral port.
pub async fn spawn_bridge(config: ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::new(config);
    let app = routes::create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub async fn connect_client(addr: SocketAddr, path: &str) -> ClientSocket {
    let (socket, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    socket
}

pub async fn send_json(socket: &mut ClientSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON text frame, skipping control frames.
pub async fn next_json(socket: &mut ClientSocket) -> Value {
    loop {
        let message = timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Next JSON frame whose `type` (or `event`) is not in `skip`.
pub async fn next_json_skipping(socket: &mut ClientSocket, skip: &[&str]) -> Value {
    loop {
        let value = next_json(socket).await;
        let kind = value
            .get("type")
            .or_else(|| value.get("event"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !skip.contains(&kind) {
            return value;
        }
    }
}

/// Wait for the server to close `socket`.
pub async fn expect_closed(socket: &mut ClientSocket) {
    loop {
        match timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for close")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

// =============================================================================
// Mock speech endpoint
// =============================================================================

/// One accepted speech-endpoint connection.
pub struct SpeechSession {
    incoming: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl SpeechSession {
    /// Next JSON frame the bridge sent to the speech endpoint.
    pub async fn recv(&mut self) -> Value {
        timeout(RECV_TIMEOUT, self.incoming.recv())
            .await
            .expect("timed out waiting for speech frame")
            .expect("speech connection closed")
    }

    /// Next frame whose `type` equals `kind`.
    pub async fn recv_type(&mut self, kind: &str) -> Value {
        loop {
            let value = self.recv().await;
            if value["type"] == kind {
                return value;
            }
        }
    }

    pub fn send(&self, value: Value) {
        let _ = self
            .outgoing
            .send(Message::Text(value.to_string().into()));
    }

    /// Close the connection from the speech side.
    pub fn drop_connection(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }

    /// Wait until the bridge closes this connection.
    pub async fn expect_closed(&mut self) {
        loop {
            match timeout(RECV_TIMEOUT, self.incoming.recv())
                .await
                .expect("timed out waiting for speech close")
            {
                None => return,
                Some(_) => {}
            }
        }
    }
}

/// Local stand-in for the realtime speech API.
pub struct MockSpeechServer {
    pub url: String,
    sessions: mpsc::UnboundedReceiver<SpeechSession>,
}

impl MockSpeechServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(socket) = accept_async(stream).await else {
                    continue;
                };
                let (incoming_tx, incoming) = mpsc::unbounded_channel();
                let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
                tokio::spawn(serve_session(socket, incoming_tx, outgoing_rx));
                if session_tx.send(SpeechSession { incoming, outgoing }).is_err() {
                    break;
                }
            }
        });

        Self { url, sessions }
    }

    /// Next connection the bridge opened.
    pub async fn accept(&mut self) -> SpeechSession {
        timeout(RECV_TIMEOUT, self.sessions.recv())
            .await
            .expect("timed out waiting for speech connection")
            .expect("mock server stopped")
    }
}

async fn serve_session(
    socket: WebSocketStream<TcpStream>,
    incoming: mpsc::UnboundedSender<Value>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        let _ = incoming.send(value);
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            message = outgoing.recv() => match message {
                Some(message) => {
                    let closing = matches!(message, Message::Close(_));
                    if write.send(message).await.is_err() || closing {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}
