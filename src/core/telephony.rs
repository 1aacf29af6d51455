//! Telephony media-stream wire types.
//!
//! Inbound frames from the carrier's media stream and the commands written
//! back to it. Audio payloads stay base64 strings end to end.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// =============================================================================
// Inbound
// =============================================================================

/// Events received on the media leg.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaEvent {
    /// Stream opened.
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartMetadata>,
    },

    /// One chunk of caller audio.
    Media {
        #[serde(default)]
        media: MediaChunk,
    },

    /// Stream ended.
    #[serde(alias = "stop")]
    Close,

    /// `connected`, `mark` and anything else the bridge ignores.
    #[serde(other)]
    Other,
}

impl MediaEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Stream id of a `start` event, preferring the nested `start.streamSid`.
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            MediaEvent::Start { stream_sid, start } => start
                .as_ref()
                .and_then(|s| s.stream_sid.as_deref())
                .or(stream_sid.as_deref()),
            _ => None,
        }
    }

    /// Carrier call id from a `start` event's metadata.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            MediaEvent::Start { start, .. } => {
                start.as_ref().and_then(|s| s.call_sid.as_deref())
            }
            _ => None,
        }
    }
}

/// The `start` block of a stream-start event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartMetadata {
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

/// The `media` block of an audio event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaChunk {
    /// Milliseconds since stream start. Missing or non-numeric values become 0.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub payload: String,
}

/// Accept integers, floats and numeric strings; everything else is 0.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(coerce_timestamp).unwrap_or(0))
}

pub(crate) fn coerce_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Commands written to the media leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    /// Play a chunk of assistant audio.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Playback progress marker. Acknowledgements are not tracked.
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// Drop any buffered playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPayload {
    pub payload: String,
}

impl TelephonyCommand {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        TelephonyCommand::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload {
                payload: payload.into(),
            },
        }
    }

    pub fn mark(stream_sid: impl Into<String>) -> Self {
        TelephonyCommand::Mark {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyCommand::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}

// =============================================================================
// Observer notices
// =============================================================================

/// Speech-endpoint status pushed to the observer leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "connection_status")]
pub struct ConnectionStatusNotice {
    pub status: &'static str,
    pub message: &'static str,
}

impl ConnectionStatusNotice {
    pub fn connected() -> Self {
        Self {
            status: "openai_connected",
            message: "OpenAI connection established",
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: "openai_disconnected",
            message: "OpenAI connection lost, reconnecting...",
        }
    }

    pub fn reconnect_failed() -> Self {
        Self {
            status: "openai_reconnect_failed",
            message: "OpenAI reconnection attempts exhausted",
        }
    }
}
