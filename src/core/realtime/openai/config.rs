//! OpenAI Realtime endpoint configuration.
//!
//! Connection settings, the voice and audio-format enums the default session
//! uses, and the session-config merge applied on every (re)connect.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use zeroize::Zeroize;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Model used when none is configured.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Transcription model requested for caller audio.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

// =============================================================================
// Voices
// =============================================================================

/// Available voices for the realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    Alloy,
    #[default]
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "ash" => Self::Ash,
            "ballad" => Self::Ballad,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            "verse" => Self::Verse,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Audio Formats
// =============================================================================

/// Audio formats accepted by the realtime session.
///
/// Telephony media streams carry 8 kHz G.711 mu-law, so that is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAIRealtimeAudioFormat {
    /// 16-bit PCM at 24kHz
    Pcm16,
    /// G.711 mu-law at 8kHz
    #[default]
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// G.711 A-law at 8kHz
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl OpenAIRealtimeAudioFormat {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }
}

// =============================================================================
// Connection Configuration
// =============================================================================

/// Settings needed to open a realtime session.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAIRealtimeConfig {
    /// Base WebSocket URL, without the model query.
    pub url: String,
    /// Bearer credential.
    pub api_key: String,
    /// Model name appended as `?model=`.
    pub model: String,
}

impl Default for OpenAIRealtimeConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl OpenAIRealtimeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
        }
    }

    /// Full endpoint URL including the model query parameter.
    pub fn endpoint_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.url, separator, self.model)
    }
}

impl std::fmt::Debug for OpenAIRealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIRealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl Drop for OpenAIRealtimeConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

// =============================================================================
// Session Defaults
// =============================================================================

/// Baseline session settings sent with every `session.update`.
pub fn default_session() -> Map<String, Value> {
    let value = json!({
        "modalities": ["text", "audio"],
        "turn_detection": { "type": "server_vad" },
        "voice": OpenAIRealtimeVoice::default().as_str(),
        "input_audio_transcription": { "model": DEFAULT_TRANSCRIPTION_MODEL },
        "input_audio_format": OpenAIRealtimeAudioFormat::default().as_str(),
        "output_audio_format": OpenAIRealtimeAudioFormat::default().as_str(),
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Overlay caller-supplied settings on the defaults.
///
/// Top-level keys from `overrides` replace defaults wholesale; keys the
/// defaults don't know are kept as-is.
pub fn merge_session(overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut session = default_session();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            session.insert(key.clone(), value.clone());
        }
    }
    session
}
