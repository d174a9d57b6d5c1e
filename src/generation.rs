//! Generation Client
//!
//! Wraps a single call to the external generation service for one customer. Content is
//! synthetic and may differ between calls; only the choice of sections (the flags) is
//! deterministic. Failures surface as typed [`EngineError`] generation variants so the
//! job controller can record them without aborting the run.

use crate::dataset::GeneratedDataset;
use crate::error::EngineError;
use crate::flags::GenerationFlags;
use crate::types::{CustomerDescriptor, Period};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod chat;
pub mod service;

pub use chat::ChatGenerationClient;
pub use service::ServiceGenerationClient;

/// Generation client trait
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a dataset for one customer, requesting only the flagged sections.
    async fn generate(
        &self,
        customer: &CustomerDescriptor,
        flags: &GenerationFlags,
        period: &Period,
    ) -> Result<GeneratedDataset, EngineError>;

    /// Short name used in logs.
    fn client_name(&self) -> &str;
}

/// Request body sent to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub customer_id: String,
    pub name: String,
    pub segment: String,
    pub sector: String,
    pub flags: GenerationFlags,
    pub period: String,
}

impl GenerationRequest {
    pub fn new(customer: &CustomerDescriptor, flags: &GenerationFlags, period: &Period) -> Self {
        Self {
            customer_id: customer.id.to_string(),
            name: customer.name.clone(),
            segment: customer.segment.clone(),
            sector: customer.sector.clone(),
            flags: *flags,
            period: period.to_string(),
        }
    }
}

/// Which wire protocol to use for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Dedicated generation endpoint taking [`GenerationRequest`] JSON.
    Service,
    /// OpenAI-compatible chat completions endpoint.
    Chat,
}

/// Generation client configuration (`[generation]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_mode")]
    pub mode: GenerationMode,

    /// Service URL, or chat API base URL (e.g. `https://api.openai.com/v1`).
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable to read the API key from when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Model name (chat mode only).
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_mode() -> GenerationMode {
    GenerationMode::Service
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            endpoint: None,
            api_key: None,
            api_key_env: None,
            model: None,
            temperature: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| "endpoint is required".to_string())?;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(format!("endpoint must be an http(s) URL, got '{}'", endpoint));
        }
        if self.mode == GenerationMode::Chat
            && self.model.as_deref().map_or(true, |m| m.trim().is_empty())
        {
            return Err("model is required in chat mode".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    /// API key from config, falling back to the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        })
    }
}

/// Stand-in for commands that never generate. Every call fails with a configuration error.
pub struct UnconfiguredClient;

#[async_trait]
impl GenerationClient for UnconfiguredClient {
    async fn generate(
        &self,
        _customer: &CustomerDescriptor,
        _flags: &GenerationFlags,
        _period: &Period,
    ) -> Result<GeneratedDataset, EngineError> {
        Err(EngineError::ConfigError(
            "generation endpoint is not configured".to_string(),
        ))
    }

    fn client_name(&self) -> &str {
        "unconfigured"
    }
}

/// Build a client for the configured mode.
pub fn create_client(config: &GenerationConfig) -> Result<Arc<dyn GenerationClient>, EngineError> {
    config
        .validate()
        .map_err(|e| EngineError::ConfigError(format!("generation: {}", e)))?;
    let http = build_http_client(config)?;
    let endpoint = config.endpoint.clone().unwrap_or_default();
    let api_key = config.resolve_api_key();
    let client: Arc<dyn GenerationClient> = match config.mode {
        GenerationMode::Service => Arc::new(ServiceGenerationClient::new(http, endpoint, api_key)),
        GenerationMode::Chat => Arc::new(ChatGenerationClient::new(
            http,
            endpoint,
            api_key,
            config.model.clone().unwrap_or_default(),
            config.temperature,
        )),
    };
    Ok(client)
}

pub(crate) fn build_http_client(config: &GenerationConfig) -> Result<Client, EngineError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| EngineError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

/// Map transport-level reqwest failures to generation errors.
pub(crate) fn map_http_error(error: reqwest::Error) -> EngineError {
    if let Some(status) = error.status() {
        map_status(status, &error.to_string())
    } else if error.is_timeout() {
        EngineError::GenerationTimeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        EngineError::GenerationRequestFailed(format!("Connection error: {}", error))
    } else if error.is_decode() {
        EngineError::GenerationMalformed(format!("Undecodable response: {}", error))
    } else {
        EngineError::GenerationRequestFailed(format!("HTTP error: {}", error))
    }
}

/// Map a non-success HTTP status to a generation error.
pub(crate) fn map_status(status: StatusCode, body: &str) -> EngineError {
    match status.as_u16() {
        401 | 403 => EngineError::GenerationAuthFailed(format!("{}: {}", status, body)),
        429 => EngineError::GenerationRateLimited(format!("{}: {}", status, body)),
        408 | 504 => EngineError::GenerationTimeout(format!("{}: {}", status, body)),
        _ => EngineError::GenerationRequestFailed(format!(
            "Request failed with status {}: {}",
            status, body
        )),
    }
}
