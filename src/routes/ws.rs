//! WebSocket route configuration
//!
//! # Endpoints
//!
//! - `GET /ws/call` - carrier media stream. At most one is active; a new
//!   connection evicts the previous one.
//! - `GET /ws/logs` - observer console. Receives every speech event and may
//!   push `session.update` messages.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{call_handler, logs_handler};
use crate::state::AppState;
use std::sync::Arc;

pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/call", get(call_handler))
        .route("/ws/logs", get(logs_handler))
        .layer(TraceLayer::new_for_http())
}
