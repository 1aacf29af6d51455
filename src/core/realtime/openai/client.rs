//! OpenAI Realtime API client implementation.
//!
//! One outbound WebSocket per call. The client owns the connection state
//! machine and the reconnect loop; the bridge sees only [`RealtimeEndpoint`].
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Headers: `Authorization: Bearer <key>`, `OpenAI-Beta: realtime=v1`
//! - Protocol: WebSocket with JSON events
//!
//! Every successful (re)connect is followed by a `session.update` carrying the
//! default session merged with the caller-supplied overrides.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::config::{OpenAIRealtimeConfig, merge_session};
use super::messages::ClientEvent;
use crate::core::realtime::base::{
    ConnectionEvent, ConnectionEventCallback, ConnectionState, MessageCallback, RealtimeEndpoint,
    RealtimeError, RealtimeFactory, RealtimeResult, ReconnectionConfig, SpeechMessage,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Upper bound on the close handshake during an explicit disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client.
///
/// Cloning is cheap and yields a handle to the same connection.
///
/// # Thread Safety
///
/// All state lives behind an `Arc` shared with the reader and reconnect tasks.
/// Connection status is an `AtomicBool` for lock-free checks; synchronous locks
/// are never held across an await.
#[derive(Clone)]
pub struct OpenAIRealtime {
    inner: Arc<Inner>,
}

struct Inner {
    config: OpenAIRealtimeConfig,
    session_config: Mutex<Option<Map<String, Value>>>,
    reconnection: Mutex<ReconnectionConfig>,
    state: Mutex<ConnectionState>,
    connected: AtomicBool,
    /// Set while a reconnect loop owns recovery.
    reconnecting: AtomicBool,
    /// Consecutive failed attempts since the last successful connect.
    attempts: AtomicU32,
    /// Bumped on every new connection and every explicit disconnect; stale
    /// readers and in-flight handshakes compare against it.
    generation: AtomicU64,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
    message_callback: RwLock<Option<MessageCallback>>,
    event_callback: RwLock<Option<ConnectionEventCallback>>,
}

impl OpenAIRealtime {
    pub fn new(config: OpenAIRealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }
        Ok(Self::with_reconnection(config, ReconnectionConfig::default()))
    }

    /// Create a client with an explicit reconnect policy.
    pub fn with_reconnection(config: OpenAIRealtimeConfig, reconnection: ReconnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                session_config: Mutex::new(None),
                reconnection: Mutex::new(reconnection),
                state: Mutex::new(ConnectionState::Disconnected),
                connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                sink: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                message_callback: RwLock::new(None),
                event_callback: RwLock::new(None),
            }),
        }
    }

    /// Current reconnect policy.
    pub fn reconnection_config(&self) -> ReconnectionConfig {
        self.inner.reconnection.lock().clone()
    }

    /// Failed attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state == next {
            return;
        }
        if !state.can_transition_to(next) {
            tracing::warn!("Unexpected connection transition {} -> {}", *state, next);
        }
        tracing::debug!("Realtime connection {} -> {}", *state, next);
        *state = next;
    }

    async fn emit(&self, event: ConnectionEvent) {
        let callback = self.event_callback.read().clone();
        if let Some(cb) = callback {
            cb(event).await;
        }
    }

    fn build_request(
        &self,
    ) -> RealtimeResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request = self
            .config
            .endpoint_url()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        Ok(request)
    }

    async fn open_socket(&self) -> RealtimeResult<WsStream> {
        let request = self.build_request()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        Ok(ws_stream)
    }

    /// One connection attempt. `attempt` is 0 for an explicit connect.
    async fn try_connect(self: &Arc<Self>, attempt: u32) -> bool {
        let generation = self.generation.load(Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting);

        let ws_stream = match self.open_socket().await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::warn!("Failed to connect to OpenAI Realtime API: {}", e);
                self.set_state(ConnectionState::Disconnected);
                return false;
            }
        };

        // A disconnect (or a competing connect) happened during the handshake.
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("Discarding realtime connection superseded during handshake");
            let mut ws_stream = ws_stream;
            let _ = ws_stream.close(None).await;
            return false;
        }
        let generation = generation + 1;

        let (ws_sink, ws_source) = ws_stream.split();
        *self.sink.lock().await = Some(ws_sink);
        self.connected.store(true, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        tracing::info!("Connected to OpenAI Realtime API");

        let reader = tokio::spawn(Arc::clone(self).read_loop(generation, ws_source));
        if let Some(previous) = self.reader.lock().replace(reader) {
            previous.abort();
        }

        let session = merge_session(self.session_config.lock().as_ref());
        let update = ClientEvent::SessionUpdate {
            session: Value::Object(session),
        };
        if !self.send_event(update).await {
            tracing::error!("Failed to send session configuration");
            return false;
        }

        self.emit(ConnectionEvent::Connected { attempt }).await;
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_loop(self: Arc<Self>, generation: u64, mut ws_source: WsSource) {
        while let Some(frame) = ws_source.next().await {
            match frame {
                Ok(Message::Text(text)) => match SpeechMessage::parse(&text) {
                    Ok(message) => {
                        let callback = self.message_callback.read().clone();
                        if let Some(cb) = callback {
                            cb(message).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse server event: {} - {}", e, text);
                    }
                },
                Ok(Message::Ping(data)) => {
                    let mut sink = self.sink.lock().await;
                    if let Some(sink) = sink.as_mut() {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            tracing::error!("Failed to send pong: {}", e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("WebSocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            }
        }

        self.connection_lost(generation);
        tracing::debug!("OpenAI Realtime reader ended");
    }

    /// Disconnection path shared by the reader and failed sends.
    ///
    /// Everything after the `connected` flip runs on a detached task, so an
    /// aborted caller still leaves the client disconnected and recovering.
    fn connection_lost(self: &Arc<Self>, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::warn!("Lost connection to OpenAI Realtime API");
        tokio::spawn(Arc::clone(self).finish_disconnect(generation));
    }

    async fn finish_disconnect(self: Arc<Self>, generation: u64) {
        {
            let mut sink = self.sink.lock().await;
            if self.generation.load(Ordering::SeqCst) == generation {
                sink.take();
            }
        }
        self.emit(ConnectionEvent::Disconnected).await;

        // An explicit connect or disconnect since the loss owns recovery now.
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if self.reconnection.lock().enabled {
            self.start_reconnect();
        }
    }

    fn start_reconnect(self: &Arc<Self>) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            tracing::debug!("Reconnect already in progress");
            return;
        }
        let token = self.cancel.lock().clone();
        let handle = tokio::spawn(Arc::clone(self).reconnect_loop(token));
        *self.reconnect_task.lock() = Some(handle);
    }

    async fn reconnect_loop(self: Arc<Self>, token: CancellationToken) {
        loop {
            let policy = self.reconnection.lock().clone();

            if self.connected.load(Ordering::SeqCst) {
                self.reconnecting.store(false, Ordering::SeqCst);
                // A loss racing the flag reset may have skipped start_reconnect.
                if self.connected.load(Ordering::SeqCst)
                    || !policy.enabled
                    || self.reconnecting.swap(true, Ordering::SeqCst)
                {
                    return;
                }
            }

            if !policy.enabled || token.is_cancelled() {
                self.reconnecting.store(false, Ordering::SeqCst);
                return;
            }

            let attempts = self.attempts.load(Ordering::SeqCst);
            if !policy.should_retry(attempts) {
                break;
            }

            let attempt = attempts + 1;
            self.attempts.store(attempt, Ordering::SeqCst);
            let delay_ms = policy.calculate_delay(attempt);
            self.set_state(ConnectionState::Reconnecting);
            tracing::info!(
                "Attempting reconnection {}/{} in {}ms",
                attempt,
                policy.max_attempts,
                delay_ms
            );
            self.emit(ConnectionEvent::Reconnecting { attempt, delay_ms })
                .await;

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Disconnect requested during reconnection delay");
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }

            if !self.reconnection.lock().enabled {
                tracing::info!("Reconnection disabled during delay");
                self.set_state(ConnectionState::Disconnected);
                self.reconnecting.store(false, Ordering::SeqCst);
                return;
            }

            if self.try_connect(attempt).await {
                tracing::info!("Reconnected to OpenAI Realtime API on attempt {}", attempt);
            } else {
                tracing::warn!("Reconnection attempt {} failed", attempt);
            }
        }

        let attempts = self.attempts.load(Ordering::SeqCst);
        tracing::error!(
            "Giving up on OpenAI Realtime API after {} reconnection attempts",
            attempts
        );
        self.set_state(ConnectionState::Disconnected);
        self.reconnecting.store(false, Ordering::SeqCst);
        self.emit(ConnectionEvent::ReconnectExhausted { attempts })
            .await;
    }

    async fn send_event(self: &Arc<Self>, event: ClientEvent) -> bool {
        match serde_json::to_value(&event) {
            Ok(message) => self.send(message).await,
            Err(e) => {
                tracing::error!("Failed to serialize event: {}", e);
                false
            }
        }
    }

    async fn send(self: &Arc<Self>, message: Value) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            tracing::debug!("Dropping outbound realtime message while disconnected");
            return false;
        }

        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize event: {}", e);
                return false;
            }
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let result = {
            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => sink.send(Message::Text(json.into())).await,
                None => return false,
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to send WebSocket message: {}", e);
                self.connection_lost(generation);
                false
            }
        }
    }

    async fn disconnect(&self, disable_reconnect: bool) {
        if disable_reconnect {
            self.reconnection.lock().enabled = false;
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut cancel = self.cancel.lock();
            cancel.cancel();
            *cancel = CancellationToken::new();
        }
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }
        self.reconnecting.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Err(e)) => tracing::debug!("Error closing realtime socket: {}", e),
                Err(_) => tracing::debug!("Timed out closing realtime socket"),
                Ok(Ok(())) => {}
            }
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Disconnected from OpenAI Realtime API");
    }
}

#[async_trait]
impl RealtimeEndpoint for OpenAIRealtime {
    async fn connect(&self) -> bool {
        if self.inner.connected.load(Ordering::SeqCst) {
            return true;
        }

        self.inner.attempts.store(0, Ordering::SeqCst);
        if self.inner.try_connect(0).await {
            return true;
        }

        if self.inner.reconnection.lock().enabled {
            self.inner.start_reconnect();
        }
        false
    }

    async fn disconnect(&self, disable_reconnect: bool) {
        self.inner.disconnect(disable_reconnect).await;
    }

    async fn send(&self, message: Value) -> bool {
        self.inner.send(message).await
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    fn on_message(&self, callback: MessageCallback) {
        *self.inner.message_callback.write() = Some(callback);
    }

    fn on_connection_event(&self, callback: ConnectionEventCallback) {
        *self.inner.event_callback.write() = Some(callback);
    }

    fn configure_reconnect(&self, config: ReconnectionConfig) {
        *self.inner.reconnection.lock() = config;
    }

    fn update_session_config(&self, session: Map<String, Value>) {
        *self.inner.session_config.lock() = Some(session);
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates one [`OpenAIRealtime`] client per call.
#[derive(Debug, Clone)]
pub struct OpenAIRealtimeFactory {
    config: OpenAIRealtimeConfig,
    reconnection: ReconnectionConfig,
}

impl OpenAIRealtimeFactory {
    pub fn new(config: OpenAIRealtimeConfig, reconnection: ReconnectionConfig) -> Self {
        Self {
            config,
            reconnection,
        }
    }
}

impl RealtimeFactory for OpenAIRealtimeFactory {
    fn create(&self) -> Arc<dyn RealtimeEndpoint> {
        Arc::new(OpenAIRealtime::with_reconnection(
            self.config.clone(),
            self.reconnection.clone(),
        ))
    }
}
