//! Session bridge between the telephony media leg and the speech endpoint.
//!
//! The bridge owns the per-call [`SessionState`] and translates in both
//! directions:
//!
//! - carrier audio becomes `input_audio_buffer.append`
//! - assistant audio deltas become carrier `media` + `mark` commands
//! - caller speech during playback truncates the assistant item and clears
//!   carrier playback (barge-in)
//! - function calls are executed and their output fed back as a conversation item
//!
//! Every speech event is also mirrored to the observer leg.

mod state;

pub use state::{SessionState, Truncation};

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::functions::FunctionExecutor;
use crate::core::realtime::{
    BoxedRealtime, ClientEvent, ConnectionEvent, RealtimeFactory, ReconnectionConfig,
    ServerEvent, SpeechMessage,
};
use crate::core::registry::{ConnectionHandle, ConnectionRegistry};
use crate::core::telephony::{ConnectionStatusNotice, MediaEvent, TelephonyCommand};

/// Bridges one call at a time.
///
/// Constructed once per process and shared through `AppState`.
pub struct SessionBridge {
    this: Weak<SessionBridge>,
    registry: Arc<ConnectionRegistry>,
    functions: Arc<dyn FunctionExecutor>,
    factory: Arc<dyn RealtimeFactory>,
    reconnection: ReconnectionConfig,
    state: Mutex<SessionState>,
    media: Mutex<Option<ConnectionHandle>>,
    observer: Mutex<Option<ConnectionHandle>>,
    speech: Mutex<Option<BoxedRealtime>>,
    /// Serializes lazy speech connects from overlapping `start` events.
    connect_lock: tokio::sync::Mutex<()>,
}

impl SessionBridge {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        functions: Arc<dyn FunctionExecutor>,
        factory: Arc<dyn RealtimeFactory>,
        reconnection: ReconnectionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            registry,
            functions,
            factory,
            reconnection,
            state: Mutex::new(SessionState::default()),
            media: Mutex::new(None),
            observer: Mutex::new(None),
            speech: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Copy of the current session state.
    pub fn session_state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// The speech endpoint for the current call, if one was created.
    pub fn speech(&self) -> Option<BoxedRealtime> {
        self.speech.lock().clone()
    }

    /// Whether the current call's speech endpoint is connected.
    pub fn speech_connected(&self) -> bool {
        self.speech().is_some_and(|s| s.is_connected())
    }

    // =========================================================================
    // Leg attachment
    // =========================================================================

    /// Make `handle` the media leg for this call.
    pub fn attach_media(&self, handle: ConnectionHandle) {
        tracing::info!(connection_id = %handle.id(), "Media leg attached");
        if let Some(previous) = self.media.lock().replace(handle) {
            previous.close();
        }
    }

    /// Make `handle` the observer leg.
    pub fn attach_observer(&self, handle: ConnectionHandle) {
        tracing::info!(connection_id = %handle.id(), "Observer leg attached");
        if let Some(previous) = self.observer.lock().replace(handle) {
            previous.close();
        }
    }

    /// Forget the observer leg if `handle` is still the current one.
    pub fn detach_observer(&self, handle: &ConnectionHandle) {
        let mut observer = self.observer.lock();
        if observer.as_ref().is_some_and(|h| h.id() == handle.id()) {
            *observer = None;
        }
    }

    /// A media dispatcher exited. Tears the call down unless a newer leg replaced it.
    pub async fn on_media_closed(&self, handle: &ConnectionHandle) {
        let is_current = self
            .media
            .lock()
            .as_ref()
            .is_some_and(|h| h.id() == handle.id());
        if is_current {
            self.teardown().await;
        } else {
            tracing::debug!(connection_id = %handle.id(), "Stale media leg closed");
        }
    }

    // =========================================================================
    // Media leg
    // =========================================================================

    pub async fn on_media_event(&self, event: MediaEvent) {
        match event {
            MediaEvent::Start { .. } => {
                let stream_id = event.stream_id().map(str::to_string);
                tracing::info!(
                    stream_id = ?stream_id,
                    call_id = ?event.call_id(),
                    "Media stream started"
                );
                self.state.lock().begin_stream(stream_id);
                self.ensure_speech_connected().await;
            }
            MediaEvent::Media { media } => {
                self.state.lock().latest_media_timestamp = media.timestamp;
                match self.speech() {
                    Some(speech) if speech.is_connected() => {
                        speech
                            .send_event(ClientEvent::append_audio(media.payload))
                            .await;
                    }
                    _ => tracing::trace!("Dropping caller audio while speech endpoint is down"),
                }
            }
            MediaEvent::Close => {
                tracing::info!("Media stream closed");
                self.teardown().await;
            }
            MediaEvent::Other => {}
        }
    }

    async fn ensure_speech_connected(&self) {
        if self.state.lock().stream_id.is_none() {
            tracing::warn!("Media start without a stream id, not connecting");
            return;
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(existing) = self.speech() {
            if existing.is_connected() {
                return;
            }
            existing.disconnect(true).await;
        }

        let speech = self.factory.create();
        speech.configure_reconnect(self.reconnection.clone());
        self.register_callbacks(&speech);
        let saved_config = self.state.lock().saved_config.clone();
        if let Some(config) = saved_config {
            speech.update_session_config(config);
        }
        *self.speech.lock() = Some(speech.clone());

        if speech.connect().await {
            tracing::info!("Speech endpoint connection established");
        } else {
            tracing::error!("Failed to establish speech endpoint connection");
        }
    }

    fn register_callbacks(&self, speech: &BoxedRealtime) {
        let this = self.this.clone();
        speech.on_message(Arc::new(move |message: SpeechMessage| {
            let this = this.clone();
            Box::pin(async move {
                if let Some(bridge) = this.upgrade() {
                    bridge.on_speech_event(message).await;
                }
            })
        }));

        let this = self.this.clone();
        speech.on_connection_event(Arc::new(move |event: ConnectionEvent| {
            let this = this.clone();
            Box::pin(async move {
                if let Some(bridge) = this.upgrade() {
                    bridge.on_connection_event(event).await;
                }
            })
        }));
    }

    async fn on_connection_event(&self, event: ConnectionEvent) {
        let notice = match event {
            ConnectionEvent::Connected { attempt } => {
                if attempt > 0 {
                    tracing::info!(attempt, "Speech endpoint reconnected");
                }
                ConnectionStatusNotice::connected()
            }
            ConnectionEvent::Disconnected => {
                tracing::warn!("Speech endpoint connection lost, attempting to reconnect");
                ConnectionStatusNotice::disconnected()
            }
            ConnectionEvent::Reconnecting { attempt, delay_ms } => {
                tracing::debug!(attempt, delay_ms, "Speech endpoint reconnect scheduled");
                return;
            }
            ConnectionEvent::ReconnectExhausted { attempts } => {
                tracing::error!(attempts, "Speech endpoint unavailable for the rest of the call");
                ConnectionStatusNotice::reconnect_failed()
            }
        };
        self.send_to_observer(&notice);
    }

    // =========================================================================
    // Observer leg
    // =========================================================================

    /// Forward an observer message to the speech endpoint, remembering session updates.
    pub async fn on_observer_event(&self, message: Value) {
        let speech = self.speech();
        if let Some(speech) = &speech {
            speech.send(message.clone()).await;
        }

        if message.get("type").and_then(Value::as_str) == Some("session.update") {
            let session = match message.get("session") {
                Some(Value::Object(session)) => session.clone(),
                _ => Map::new(),
            };
            if let Some(speech) = &speech {
                speech.update_session_config(session.clone());
            }
            self.state.lock().saved_config = Some(session);
            tracing::debug!("Saved observer session configuration");
        }
    }

    // =========================================================================
    // Speech endpoint
    // =========================================================================

    pub async fn on_speech_event(&self, message: SpeechMessage) {
        self.send_to_observer(&message.raw);

        match message.event {
            ServerEvent::SpeechStarted => self.truncate().await,
            ServerEvent::AudioDelta { item_id, delta } => self.play_audio(item_id, delta).await,
            ServerEvent::OutputItemDone { item: Some(item) } => {
                if let Some((name, arguments, call_id)) = item.as_function_call() {
                    self.spawn_function_call(
                        name.to_string(),
                        arguments.to_string(),
                        call_id.to_string(),
                    );
                }
            }
            ServerEvent::SessionCreated { .. } => tracing::info!("Speech session created"),
            ServerEvent::Error { error } => {
                tracing::warn!(error = ?error, "Speech endpoint reported an error");
            }
            ServerEvent::OutputItemDone { item: None } | ServerEvent::Other => {}
        }
    }

    async fn play_audio(&self, item_id: Option<String>, delta: String) {
        let has_media = self.media.lock().is_some();
        let stream_id = {
            let mut state = self.state.lock();
            let Some(stream_id) = state.stream_id.clone() else {
                return;
            };
            if !has_media {
                return;
            }
            state.note_audio_delta(item_id);
            stream_id
        };

        if delta.is_empty() {
            return;
        }
        self.send_to_media(&TelephonyCommand::media(stream_id.clone(), delta))
            .await;
        self.send_to_media(&TelephonyCommand::mark(stream_id)).await;
    }

    async fn truncate(&self) {
        let Some(truncation) = self.state.lock().take_truncation() else {
            return;
        };
        tracing::info!(
            item_id = %truncation.item_id,
            audio_end_ms = truncation.audio_end_ms,
            "Caller barged in, truncating assistant audio"
        );

        if let Some(speech) = self.speech() {
            speech
                .send_event(ClientEvent::truncate(
                    truncation.item_id,
                    truncation.audio_end_ms,
                ))
                .await;
        }
        if let Some(stream_id) = truncation.stream_id {
            self.send_to_media(&TelephonyCommand::clear(stream_id)).await;
        }
    }

    fn spawn_function_call(&self, name: String, arguments: String, call_id: String) {
        let this = self.this.clone();
        tokio::spawn(async move {
            let Some(bridge) = this.upgrade() else {
                return;
            };
            tracing::info!(function = %name, call_id = %call_id, "Handling function call");
            let output = bridge.functions.execute(&name, &arguments).await;

            let Some(speech) = bridge.speech() else {
                tracing::warn!(call_id = %call_id, "No speech endpoint for function output");
                return;
            };
            speech
                .send_event(ClientEvent::function_output(call_id, output))
                .await;
            speech.send_event(ClientEvent::ResponseCreate {}).await;
        });
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Close both legs, disconnect the speech endpoint and reset the session.
    pub async fn teardown(&self) {
        let media = self.media.lock().take();
        let observer = self.observer.lock().take();
        let speech = self.speech.lock().take();

        for handle in [media, observer].into_iter().flatten() {
            handle.close();
            self.registry.release(&handle);
        }
        if let Some(speech) = speech {
            speech.disconnect(true).await;
        }

        *self.state.lock() = SessionState::default();
        tracing::info!("All connections disconnected");
    }

    // =========================================================================
    // Outbound helpers
    // =========================================================================

    async fn send_to_media<T: Serialize + ?Sized>(&self, message: &T) {
        let Some(handle) = self.media.lock().clone() else {
            return;
        };
        if !self.registry.send_json_to(&handle, message).await {
            tracing::error!(role = %handle.role(), "Error sending to connection");
        }
    }

    /// Mirror to the observer without waiting on a slow reader.
    fn send_to_observer<T: Serialize + ?Sized>(&self, message: &T) {
        let Some(handle) = self.observer.lock().clone() else {
            return;
        };
        if !self.registry.try_send_json_to(&handle, message) && handle.is_closed() {
            self.detach_observer(&handle);
        }
    }
}
