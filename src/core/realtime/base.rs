//! Base traits and types for the speech-endpoint connection.
//!
//! This module defines the foundational abstractions for a speech model reached
//! over a bidirectional WebSocket: the connection state machine, the reconnect
//! policy, the typed lifecycle events and the [`RealtimeEndpoint`] trait the
//! session bridge drives.
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲   │                   │                  │
//!      │   └──────reconnect────┼──────────────────┘ (peer close / send failure)
//!      │                       ▼
//!      └───exhausted─── Reconnecting ──backoff──▶ Connecting
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use super::openai::messages::{ClientEvent, ServerEvent};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the speech endpoint.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Reconnection Policy
// =============================================================================

/// Configuration for automatic reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectionConfig {
    /// Enable automatic reconnection on connection loss.
    /// Default: true
    pub enabled: bool,

    /// Maximum number of reconnection attempts before giving up.
    /// Default: 5
    pub max_attempts: u32,

    /// Initial delay between reconnection attempts (milliseconds).
    /// Default: 1000ms
    pub initial_delay_ms: u64,

    /// Maximum delay between reconnection attempts (milliseconds).
    /// Default: 30000ms (30 seconds)
    pub max_delay_ms: u64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
        }
    }
}

impl ReconnectionConfig {
    /// Create a config with reconnection disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Policy used for live calls: 10 attempts, 2s doubling up to 60s.
    pub fn for_calls() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_delay_ms: 2000,
            max_delay_ms: 60000,
        }
    }

    /// Calculate the delay for a given attempt number using exponential backoff.
    ///
    /// `attempt` is 1-based: `initial_delay * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Check if more reconnection attempts are allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.enabled && attempts < self.max_attempts
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the speech endpoint client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected to the provider
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Disconnected, Reconnecting)
                | (Connecting, Connected)
                | (Reconnecting, Connecting)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Typed lifecycle events emitted on state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A session was established. `attempt` is 0 for the initial connect.
    Connected { attempt: u32 },
    /// An established session was lost.
    Disconnected,
    /// A reconnect attempt is scheduled after `delay_ms`.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// The attempt budget ran out while still disconnected. Terminal.
    ReconnectExhausted { attempts: u32 },
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// A frame received from the speech endpoint.
///
/// `raw` is the frame exactly as parsed JSON, used for the observer mirror;
/// `event` is the typed view the bridge dispatches on.
#[derive(Debug, Clone)]
pub struct SpeechMessage {
    pub raw: serde_json::Value,
    pub event: ServerEvent,
}

impl SpeechMessage {
    /// Parse a text frame. Fails only if the frame is not JSON at all.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        Ok(Self::from_value(raw))
    }

    /// Build the typed view of an already-parsed frame.
    pub fn from_value(raw: serde_json::Value) -> Self {
        let event = ServerEvent::deserialize(&raw).unwrap_or_else(|e| {
            tracing::debug!("Untyped speech event ({}): {}", e, raw["type"]);
            ServerEvent::Other
        });
        Self { raw, event }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for inbound speech messages.
pub type MessageCallback =
    Arc<dyn Fn(SpeechMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for connection lifecycle events.
pub type ConnectionEventCallback =
    Arc<dyn Fn(ConnectionEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// A speech-model session reached over one outbound WebSocket.
///
/// Operations report outcomes as booleans rather than errors: the bridge only
/// needs to know whether a command went out, and transport faults are handled
/// inside the client by the reconnect policy.
#[async_trait]
pub trait RealtimeEndpoint: Send + Sync {
    /// Open the session. Returns whether the connection was established.
    async fn connect(&self) -> bool;

    /// Close the session, optionally disabling any further automatic reconnects.
    async fn disconnect(&self, disable_reconnect: bool);

    /// Send a JSON message. Returns false if not connected or the send failed.
    async fn send(&self, message: serde_json::Value) -> bool;

    /// Send a typed client event.
    async fn send_event(&self, event: ClientEvent) -> bool {
        match serde_json::to_value(&event) {
            Ok(message) => self.send(message).await,
            Err(e) => {
                tracing::error!("Failed to serialize client event: {}", e);
                false
            }
        }
    }

    /// Whether the endpoint is connected.
    fn is_connected(&self) -> bool;

    /// Current state of the connection state machine.
    fn connection_state(&self) -> ConnectionState;

    /// Register the handler for inbound messages.
    fn on_message(&self, callback: MessageCallback);

    /// Register the handler for lifecycle transitions.
    fn on_connection_event(&self, callback: ConnectionEventCallback);

    /// Replace the reconnect policy.
    fn configure_reconnect(&self, config: ReconnectionConfig);

    /// Replace the caller-supplied session configuration replayed on every (re)connect.
    fn update_session_config(&self, session: serde_json::Map<String, serde_json::Value>);
}

// =============================================================================
// Factory
// =============================================================================

/// Shared trait object for speech endpoints.
pub type BoxedRealtime = Arc<dyn RealtimeEndpoint>;

/// Factory for creating a fresh endpoint per call.
pub trait RealtimeFactory: Send + Sync {
    /// Create a new, not yet connected endpoint.
    fn create(&self) -> BoxedRealtime;
}
