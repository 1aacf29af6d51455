//! Speech-endpoint connection module.
//!
//! # Architecture
//!
//! - [`RealtimeEndpoint`] trait for the connection the bridge drives
//! - [`RealtimeFactory`] so each call gets a fresh endpoint
//! - Callback-based delivery of inbound frames and lifecycle events
//!
//! The only implementation is the OpenAI Realtime client in [`openai`].

mod base;
pub mod openai;

pub use base::{
    BoxedRealtime, ConnectionEvent, ConnectionEventCallback, ConnectionState, MessageCallback,
    RealtimeEndpoint, RealtimeError, RealtimeFactory, RealtimeResult, ReconnectionConfig,
    SpeechMessage,
};
pub use openai::{
    ClientEvent, OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeConfig, OpenAIRealtimeFactory,
    ServerEvent,
};
