//! Gemini generateContent 驱动：单轮文本提示，错误按 HTTP 状态分类
//!
//! Google Gemini `generateContent` provider:
//! - Prompt goes in `contents[0].parts[0].text` with role `user`.
//! - Response text is the concatenation of `candidates[0].content.parts[*].text`.
//! - A prompt blocked by safety filters (`promptFeedback.blockReason`) is a
//!   permanent failure.
//! - API key is passed as `?key=` query parameter, not in headers.

use super::{ErrorClass, Provider, ProviderError};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use keyring::Entry;
use reqwest::Proxy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    /// Explicit key; when absent the keyring and environment are consulted.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Transport-level timeout for one HTTP exchange.
    #[serde(with = "crate::config::duration_secs")]
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(Self::lookup_api_key)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "no API key configured for the AI provider",
                    ErrorContext::new()
                        .with_field_path("provider.api_key")
                        .with_details("set API_KEY or GEMINI_API_KEY, or store it in the OS keyring")
                        .with_source("gemini_provider"),
                )
            })?;

        url::Url::parse(&config.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid provider base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("provider.base_url")
                    .with_source("gemini_provider"),
            )
        })?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)));
        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }
        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("gemini_provider"),
            )
        })?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        tracing::info!(model = %config.model, "gemini provider initialized");

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
        })
    }

    fn lookup_api_key() -> Option<String> {
        // 1. Try Keyring
        if let Ok(entry) = Entry::new("vision-mediator", "gemini") {
            if let Ok(key) = entry.get_password() {
                return Some(key);
            }
        }

        // 2. Try Environment Variables
        ["GEMINI_API_KEY", "API_KEY"]
            .iter()
            .filter_map(|name| env::var(name).ok())
            .find(|k| !k.trim().is_empty())
    }

    fn request_body(prompt: &str) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        })
    }

    fn extract_text(body: &Value) -> std::result::Result<String, ProviderError> {
        if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
            return Err(ProviderError::new(
                ErrorClass::InvalidRequest,
                format!("prompt blocked: {}", reason),
            ));
        }
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                ProviderError::new(ErrorClass::MalformedResponse, "response has no candidates")
            })?;
        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::new(
                ErrorClass::MalformedResponse,
                "response contained no text",
            ));
        }
        Ok(text.to_string())
    }

    fn transport_error(e: reqwest::Error) -> ProviderError {
        let class = if e.is_timeout() {
            ErrorClass::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body() {
            ErrorClass::Connection
        } else if e.is_decode() {
            ErrorClass::MalformedResponse
        } else {
            ErrorClass::Other
        };
        ProviderError::new(class, e.to_string())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::request_body(prompt))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let message = body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        let body: Value = resp.json().await.map_err(Self::transport_error)?;
        Self::extract_text(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
