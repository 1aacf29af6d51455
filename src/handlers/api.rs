//! REST endpoints around the bridge: service banner, TwiML, tools and health.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::functions::FunctionSchema;
use crate::core::realtime::ConnectionState;
use crate::core::registry::ConnectionRole;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// TwiML returned to the carrier when a call comes in.
pub const TWIML_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>Connected</Say>
  <Connect>
    <Stream url="{{WS_URL}}" />
  </Connect>
  <Say>Disconnected</Say>
</Response>"#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUrlResponse {
    pub public_url: String,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<FunctionSchema>,
}

#[derive(Debug, Serialize)]
pub struct SpeechHealth {
    pub state: ConnectionState,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectionCounts {
    pub media: usize,
    pub observer: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub speech: SpeechHealth,
    pub connections: ConnectionCounts,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Call bridge server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Render TwiML pointing the carrier's media stream at `/ws/call`.
pub async fn twiml(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let ws_url = state.config.media_stream_url().ok_or_else(|| {
        AppError::Internal(format!(
            "PUBLIC_URL has no host: {}",
            state.config.public_url
        ))
    })?;
    let body = TWIML_TEMPLATE.replace("{{WS_URL}}", &ws_url);
    Ok(([(header::CONTENT_TYPE, "application/xml")], body).into_response())
}

pub async fn public_url(State(state): State<Arc<AppState>>) -> Json<PublicUrlResponse> {
    Json(PublicUrlResponse {
        public_url: state.config.public_url.clone(),
    })
}

pub async fn tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.functions.schemas(),
    })
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let speech = state.bridge.speech();
    Json(HealthResponse {
        status: "ok",
        speech: SpeechHealth {
            state: speech
                .as_ref()
                .map(|s| s.connection_state())
                .unwrap_or_default(),
            connected: speech.is_some_and(|s| s.is_connected()),
        },
        connections: ConnectionCounts {
            media: state.registry.count(ConnectionRole::Media),
            observer: state.registry.count(ConnectionRole::Observer),
        },
    })
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
