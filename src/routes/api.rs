use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the REST router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::root))
        .route("/twiml", get(api::twiml).post(api::twiml))
        .route("/public-url", get(api::public_url))
        .route("/tools", get(api::tools))
        .route("/health", get(api::health_check))
        .layer(TraceLayer::new_for_http())
}
