//! Function (tool) execution for speech-model tool calls.
//!
//! The bridge hands a function name and its raw JSON argument string to a
//! [`FunctionExecutor`] and always gets a JSON string back. Failures are
//! reported inside that string as `{"error": "..."}` so the conversation can
//! continue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Open-Meteo forecast endpoint.
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Name of the built-in weather function.
pub const WEATHER_FUNCTION_NAME: &str = "get_weather_from_coords";

/// Schema advertised to the speech model for one callable function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("No handler found for function: {0}")]
    UnknownFunction(String),

    #[error("Invalid JSON arguments for function call")]
    InvalidArguments(#[source] serde_json::Error),

    #[error("Error running function {name}: {message}")]
    Execution { name: String, message: String },
}

impl FunctionError {
    /// The `{"error": ...}` result string delivered back to the conversation.
    pub fn to_output(&self) -> String {
        json!({ "error": self.to_string() }).to_string()
    }
}

/// Async function body. Receives parsed arguments, returns the JSON result.
pub type FunctionHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>> + Send + Sync,
>;

/// Executes tool calls on behalf of the session bridge.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// Run `name` with the raw JSON `arguments`. Never fails; errors are encoded in the result.
    async fn execute(&self, name: &str, arguments: &str) -> String;

    /// Schemas for every callable function.
    fn schemas(&self) -> Vec<FunctionSchema>;
}

/// Name-indexed set of function handlers.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    handlers: HashMap<String, FunctionHandler>,
    schemas: Vec<FunctionSchema>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in weather lookup against `weather_api_url`.
    pub fn with_defaults(http: reqwest::Client, weather_api_url: impl Into<String>) -> Self {
        let mut registry = Self::new();
        let weather = Arc::new(WeatherClient::new(http, weather_api_url));
        registry.register_function(
            WEATHER_FUNCTION_NAME,
            "Get the current weather from coordinates",
            json!({
                "type": "object",
                "properties": {
                    "latitude": {
                        "type": "number",
                        "description": "Latitude coordinate"
                    },
                    "longitude": {
                        "type": "number",
                        "description": "Longitude coordinate"
                    }
                },
                "required": ["latitude", "longitude"]
            }),
            Arc::new(move |args| {
                let weather = weather.clone();
                Box::pin(async move { Ok(weather.current_temperature(&args).await) })
            }),
        );
        registry
    }

    /// Register a function, replacing any previous one of the same name.
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: FunctionHandler,
    ) {
        let name = name.into();
        self.schemas.retain(|schema| schema.name != name);
        self.schemas.push(FunctionSchema {
            kind: "function",
            name: name.clone(),
            description: description.into(),
            parameters,
        });
        self.handlers.insert(name, handler);
    }

    async fn run(&self, name: &str, arguments: &str) -> Result<Value, FunctionError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| FunctionError::UnknownFunction(name.to_string()))?;
        let args: Value = serde_json::from_str(arguments).map_err(FunctionError::InvalidArguments)?;
        handler(args)
            .await
            .map_err(|message| FunctionError::Execution {
                name: name.to_string(),
                message,
            })
    }
}

#[async_trait]
impl FunctionExecutor for FunctionRegistry {
    async fn execute(&self, name: &str, arguments: &str) -> String {
        match self.run(name, arguments).await {
            Ok(result) => result.to_string(),
            Err(e) => {
                tracing::warn!(function = name, "Function call failed: {}", e);
                e.to_output()
            }
        }
    }

    fn schemas(&self) -> Vec<FunctionSchema> {
        self.schemas.clone()
    }
}

// =============================================================================
// Weather
// =============================================================================

/// Minimal Open-Meteo client backing the weather function.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// `{"temp": <current temperature>}` or an `{"error": ...}` object.
    pub async fn current_temperature(&self, args: &Value) -> Value {
        let (Some(latitude), Some(longitude)) =
            (coordinate(&args["latitude"]), coordinate(&args["longitude"]))
        else {
            return json!({ "error": "Missing latitude or longitude" });
        };

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m,wind_speed_10m".to_string()),
                (
                    "hourly",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m".to_string(),
                ),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return json!({ "error": format!("Failed to fetch weather data: {}", e) }),
        };

        if !response.status().is_success() {
            return json!({
                "error": format!("Weather API returned status {}", response.status().as_u16())
            });
        }

        match response.json::<Value>().await {
            Ok(data) => json!({ "temp": data["current"]["temperature_2m"] }),
            Err(e) => json!({ "error": format!("Failed to fetch weather data: {}", e) }),
        }
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
