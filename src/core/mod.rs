pub mod bridge;
pub mod functions;
pub mod realtime;
pub mod registry;
pub mod telephony;

// Re-export commonly used types for convenience
pub use bridge::{SessionBridge, SessionState};
pub use functions::{FunctionExecutor, FunctionRegistry, FunctionSchema};
pub use realtime::{
    BoxedRealtime, ConnectionEvent, ConnectionState, OpenAIRealtime, RealtimeEndpoint,
    RealtimeError, RealtimeFactory, RealtimeResult, ReconnectionConfig, SpeechMessage,
};
pub use registry::{ConnectionHandle, ConnectionRegistry, ConnectionRole};
pub use telephony::{MediaEvent, TelephonyCommand};
