//! Extraction backend — structured completions over an OpenAI-compatible
//! chat endpoint.
//!
//! The trait is the seam: the pipeline and tests depend on it, the HTTP
//! implementation is the only production impl. A 429 from the endpoint
//! becomes the distinguishable rate-limit error the retry policy keys on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::error::{ConfigError, ExtractError};

/// Default chat completions endpoint.
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default extraction model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Extraction backend configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
}

impl ExtractorConfig {
    /// Build config from environment variables.
    /// `EXTRACTOR_API_KEY` is required; endpoint and model have defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("EXTRACTOR_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("EXTRACTOR_API_KEY".into()))?;
        Ok(Self {
            endpoint: std::env::var("EXTRACTOR_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            api_key: SecretString::from(api_key),
            model: std::env::var("EXTRACTOR_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }
}

/// A role-tagged prompt pair for one structured completion.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl ExtractRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Completion backend for extraction calls.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Run one completion and return the raw content text.
    async fn complete(&self, request: ExtractRequest) -> Result<String, ExtractError>;
}

/// HTTP backend for an OpenAI-compatible chat completions API.
pub struct HttpBackend {
    http: reqwest::Client,
    config: ExtractorConfig,
}

impl HttpBackend {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: ExtractRequest) -> Result<String, ExtractError> {
        let resp = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&json!({
                "model": self.config.model,
                "temperature": request.temperature,
                "messages": [
                    { "role": "system", "content": request.system },
                    { "role": "user", "content": request.user },
                ],
                "response_format": { "type": "json_object" },
            }))
            .send()
            .await
            .map_err(|e| ExtractError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ExtractError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::RequestFailed {
                reason: format!("status {status}: {body}"),
            });
        }

        let payload: serde_json::Value =
            resp.json().await.map_err(|e| ExtractError::InvalidResponse {
                reason: format!("response body was not JSON: {e}"),
            })?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ExtractError::InvalidResponse {
                reason: format!("no completion content in response: {payload}"),
            })
    }
}
