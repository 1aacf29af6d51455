//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::bridge::SessionBridge;
use crate::core::functions::{FunctionExecutor, FunctionRegistry};
use crate::core::realtime::{OpenAIRealtimeFactory, RealtimeFactory};
use crate::core::registry::ConnectionRegistry;

pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub functions: Arc<dyn FunctionExecutor>,
    pub bridge: Arc<SessionBridge>,
}

impl AppState {
    /// Wire the production collaborators from `config`.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let http = reqwest::Client::new();
        let functions: Arc<dyn FunctionExecutor> = Arc::new(FunctionRegistry::with_defaults(
            http,
            config.weather_api_url.clone(),
        ));
        let factory: Arc<dyn RealtimeFactory> = Arc::new(OpenAIRealtimeFactory::new(
            config.realtime_config(),
            config.reconnect.clone(),
        ));
        Self::with_collaborators(config, functions, factory)
    }

    /// Build state around caller-supplied collaborators.
    pub fn with_collaborators(
        config: ServerConfig,
        functions: Arc<dyn FunctionExecutor>,
        factory: Arc<dyn RealtimeFactory>,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let bridge = SessionBridge::new(
            registry.clone(),
            functions.clone(),
            factory,
            config.reconnect.clone(),
        );
        Arc::new(Self {
            config,
            registry,
            functions,
            bridge,
        })
    }
}
