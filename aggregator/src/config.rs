use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that replaces `downstream.base_url` when set.
pub const BASE_URL_ENV: &str = "MOCK_API_URL";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Downstream base URL cannot be used as a base: {0}")]
    InvalidBaseUrl(Url),

    #[error("Downstream base URL must be http or https: {0}")]
    UnsupportedScheme(Url),

    #[error("Empty api key header name")]
    EmptyApiKeyHeader,

    #[error("Request timeout cannot be 0")]
    InvalidRequestTimeout,

    #[error("Invalid MOCK_API_URL override {0:?}: {1}")]
    InvalidOverride(String, url::ParseError),
}

/// How a pipeline stage is driven while the handler waits for it
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageExecution {
    /// Awaited directly on the request task
    #[default]
    Inline,
    /// Run on its own task and joined by the handler
    Spawned,
}

/// Aggregator configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    #[serde(default)]
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    #[serde(default)]
    pub admin_listener: Option<Listener>,
    /// Downstream API the gateway aggregates from
    #[serde(default)]
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub stage_execution: StageExecution,
}

impl Config {
    /// Validates the aggregator configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin_listener) = &self.admin_listener {
            admin_listener.validate()?;
        }
        self.downstream.validate()
    }

    /// Applies environment overrides. Called once at startup; `lookup` is
    /// injected so tests never touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
            let url = Url::parse(&raw).map_err(|e| ValidationError::InvalidOverride(raw, e))?;
            self.downstream.base_url = url;
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Downstream API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Base URL; `/users` and `/entries` are joined onto its path
    pub base_url: Url,
    /// Value of the static identifying header sent on every call
    pub api_key: String,
    /// Name of the static identifying header
    pub api_key_header: String,
    /// Deadline for one inbound request, covering every downstream call it makes
    pub request_timeout_secs: Option<u64>,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        DownstreamConfig {
            base_url: Url::parse("http://mock-api").expect("static URL is valid"),
            api_key: "dip".into(),
            api_key_header: "key".into(),
            request_timeout_secs: None,
        }
    }
}

impl DownstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ValidationError::InvalidBaseUrl(self.base_url.clone()));
        }
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(ValidationError::UnsupportedScheme(self.base_url.clone()));
        }
        if self.api_key_header.is_empty() {
            return Err(ValidationError::EmptyApiKeyHeader);
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidRequestTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
