pub mod api;
pub mod ws;

use axum::Router;
use std::sync::Arc;

use crate::handlers::api::not_found;
use crate::state::AppState;

/// Every route with state applied. Cross-cutting layers (CORS, headers) are added by the binary.
pub fn create_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(ws::create_ws_router())
        .fallback(not_found)
        .with_state(state)
}
