//! Configuration module for the call bridge server
//!
//! Configuration comes from `.env` files, environment variables and an optional
//! YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::realtime::ReconnectionConfig;
use crate::core::realtime::openai::OpenAIRealtimeConfig;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the bridge:
/// - Server settings (host, port, public URL, TLS)
/// - Speech endpoint credentials and model
/// - Reconnect policy applied to each call's speech connection
/// - Function backend settings
/// - Security settings (CORS)
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Public base URL the carrier reaches this server on (required)
    pub public_url: String,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Speech endpoint
    /// Bearer credential for the realtime API (required)
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_realtime_url: String,

    /// Reconnect policy for the speech connection.
    /// Default: enabled, 10 attempts, 2s initial delay, 60s ceiling
    pub reconnect: ReconnectionConfig,

    /// Forecast endpoint used by the weather function
    pub weather_api_url: String,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (all origins, as the carrier console expects)
    pub cors_allowed_origins: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("tls", &self.tls)
            .field("openai_api_key", &"<redacted>")
            .field("openai_model", &self.openai_model)
            .field("openai_realtime_url", &self.openai_realtime_url)
            .field("reconnect", &self.reconnect)
            .field("weather_api_url", &self.weather_api_url)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

/// Zeroize secrets when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.openai_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Expects `.env` to have been loaded already (done in `main`).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load()?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(public_url) = server.public_url {
                self.public_url = public_url;
            }
            if let Some(tls) = server.tls {
                match (tls.enabled, tls.cert_path, tls.key_path) {
                    (Some(false), _, _) => self.tls = None,
                    (_, Some(cert), Some(key)) => {
                        self.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        })
                    }
                    (Some(true), _, _) => {
                        return Err("TLS enabled but cert_path or key_path is missing".into());
                    }
                    _ => {}
                }
            }
        }

        if let Some(openai) = yaml.openai {
            if let Some(api_key) = openai.api_key {
                self.openai_api_key = api_key;
            }
            if let Some(model) = openai.model {
                self.openai_model = model;
            }
            if let Some(url) = openai.realtime_url {
                self.openai_realtime_url = url;
            }
        }

        if let Some(reconnect) = yaml.reconnect {
            if let Some(enabled) = reconnect.enabled {
                self.reconnect.enabled = enabled;
            }
            if let Some(max_attempts) = reconnect.max_attempts {
                self.reconnect.max_attempts = max_attempts;
            }
            if let Some(initial) = reconnect.initial_delay_ms {
                self.reconnect.initial_delay_ms = initial;
            }
            if let Some(max) = reconnect.max_delay_ms {
                self.reconnect.max_delay_ms = max;
            }
        }

        if let Some(url) = yaml.functions.and_then(|f| f.weather_api_url) {
            self.weather_api_url = url;
        }

        if let Some(origins) = yaml.security.and_then(|s| s.cors_allowed_origins) {
            self.cors_allowed_origins = Some(origins);
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.openai_api_key.trim().is_empty() {
            return Err("OPENAI_API_KEY environment variable is required".into());
        }
        if self.public_url.trim().is_empty() {
            return Err("PUBLIC_URL environment variable is required".into());
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err(format!(
                "Reconnect max delay ({}ms) must not be below the initial delay ({}ms)",
                self.reconnect.max_delay_ms, self.reconnect.initial_delay_ms
            )
            .into());
        }
        Ok(())
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Host (and port, if any) of the public URL.
    ///
    /// Returns `None` when the URL has no scheme or no host.
    pub fn public_host(&self) -> Option<String> {
        let parsed = url::Url::parse(self.public_url.trim()).ok()?;
        let host = parsed.host_str().filter(|h| !h.is_empty())?;
        Some(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// WebSocket URL the carrier should stream call media to.
    pub fn media_stream_url(&self) -> Option<String> {
        self.public_host()
            .map(|host| format!("wss://{host}/ws/call"))
    }

    /// Connection settings for the speech endpoint.
    pub fn realtime_config(&self) -> OpenAIRealtimeConfig {
        OpenAIRealtimeConfig {
            url: self.openai_realtime_url.clone(),
            api_key: self.openai_api_key.clone(),
            model: self.openai_model.clone(),
        }
    }
}
