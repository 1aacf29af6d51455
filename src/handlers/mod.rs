//! HTTP and WebSocket request handlers
//!
//! - `api` - Banner, TwiML, tools and health endpoints
//! - `call` - Media leg WebSocket (`/ws/call`)
//! - `logs` - Observer leg WebSocket (`/ws/logs`)

pub mod api;
pub mod call;
pub mod logs;
mod socket;

pub use call::call_handler;
pub use logs::logs_handler;
