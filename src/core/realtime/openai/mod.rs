//! OpenAI Realtime API module.
//!
//! Speech-model sessions over OpenAI's WebSocket Realtime API.
//!
//! # Audio Format
//!
//! Sessions are configured for G.711 mu-law in both directions so telephony
//! payloads pass through without transcoding.

mod client;
mod config;
pub mod messages;

pub use client::{OpenAIRealtime, OpenAIRealtimeFactory};
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_URL,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig, OpenAIRealtimeVoice, default_session,
    merge_session,
};
pub use messages::{ClientEvent, ConversationItem, OutputItem, ServerEvent};
