//! Environment variable loading.
//!
//! Produces the base [`ServerConfig`] that YAML values are layered on top of.
//! Required values are not checked here; see `ServerConfig::validate`.

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};
use crate::core::functions::DEFAULT_WEATHER_API_URL;
use crate::core::realtime::ReconnectionConfig;
use crate::core::realtime::openai::{DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL};

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 8081;

/// Non-empty value of an environment variable.
pub(super) fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, failing on malformed values.
pub(super) fn env_parse<T>(key: &str) -> Result<Option<T>, Box<dyn Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: {raw} ({e})").into()),
        None => Ok(None),
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
pub(super) fn env_bool(key: &str) -> Result<Option<bool>, Box<dyn Error>> {
    match env_var(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid value for {key}: {raw} (expected a boolean)").into()),
        },
        None => Ok(None),
    }
}

/// Build a configuration from environment variables and defaults.
pub(super) fn load() -> Result<ServerConfig, Box<dyn Error>> {
    let defaults = ReconnectionConfig::for_calls();
    let reconnect = ReconnectionConfig {
        enabled: env_bool("RECONNECT_ENABLED")?.unwrap_or(defaults.enabled),
        max_attempts: env_parse("RECONNECT_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
        initial_delay_ms: env_parse("RECONNECT_INITIAL_DELAY_MS")?
            .unwrap_or(defaults.initial_delay_ms),
        max_delay_ms: env_parse("RECONNECT_MAX_DELAY_MS")?.unwrap_or(defaults.max_delay_ms),
    };

    let tls = match (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };

    Ok(ServerConfig {
        host: env_var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env_parse("PORT")?.unwrap_or(DEFAULT_PORT),
        public_url: env_var("PUBLIC_URL").unwrap_or_default(),
        tls,
        openai_api_key: env_var("OPENAI_API_KEY").unwrap_or_default(),
        openai_model: env_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        openai_realtime_url: env_var("OPENAI_REALTIME_URL")
            .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        reconnect,
        weather_api_url: env_var("WEATHER_API_URL")
            .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
        cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS"),
    })
}
