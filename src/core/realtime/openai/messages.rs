//! Wire messages exchanged with the speech endpoint.
//!
//! Only the events the bridge acts on are typed. Everything else the endpoint
//! sends lands in [`ServerEvent::Other`] and is still mirrored to the observer
//! as the raw frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Client Events (sent to the speech endpoint)
// =============================================================================

/// Events sent to the speech endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration.
    #[serde(rename = "session.update")]
    SessionUpdate { session: Value },

    /// Append caller audio. The payload is passed through exactly as received.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    /// Create a conversation item.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Truncate assistant audio that the caller never heard.
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },

    /// Ask the model to produce a response.
    #[serde(rename = "response.create")]
    ResponseCreate {},
}

impl ClientEvent {
    /// Audio append for one base64 payload.
    pub fn append_audio(audio: impl Into<String>) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: audio.into(),
        }
    }

    /// Truncation of `item_id` at `audio_end_ms`, always on content index 0.
    pub fn truncate(item_id: impl Into<String>, audio_end_ms: u64) -> Self {
        ClientEvent::ConversationItemTruncate {
            item_id: item_id.into(),
            content_index: 0,
            audio_end_ms,
        }
    }

    /// Tool result item answering `call_id`.
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, output),
        }
    }
}

/// Conversation item payload.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id.into()),
            output: Some(output.into()),
        }
    }
}

// =============================================================================
// Server Events (received from the speech endpoint)
// =============================================================================

/// Events received from the speech endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The caller started speaking.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// A chunk of assistant audio.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        delta: String,
    },

    /// An output item finished.
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        item: Option<OutputItem>,
    },

    /// Session established.
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Option<Value>,
    },

    /// Error reported by the endpoint.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<Value>,
    },

    /// Any event the bridge does not act on.
    #[serde(other)]
    Other,
}

/// The item carried by `response.output_item.done`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
}

impl OutputItem {
    /// A complete tool call: `(name, arguments, call_id)`.
    ///
    /// Missing arguments are treated as an empty object.
    pub fn as_function_call(&self) -> Option<(&str, &str, &str)> {
        if self.item_type != "function_call" {
            return None;
        }
        let name = self.name.as_deref()?;
        let call_id = self.call_id.as_deref()?;
        Some((name, self.arguments.as_deref().unwrap_or("{}"), call_id))
    }
}
