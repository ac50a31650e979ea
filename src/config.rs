//! Mediator configuration: defaults, YAML files and environment overrides.

use crate::provider::GeminiConfig;
use crate::resilience::rate_limiter::{FailurePolicy, RateLimiterConfig};
use crate::resilience::retry::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Serde helpers for durations written as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Serde helpers for durations written as milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Remote store address. `None`, empty or `memory://` selects the local map.
    pub redis_url: Option<String>,
    /// Bound on every remote cache operation.
    #[serde(with = "duration_millis")]
    pub cache_timeout: Duration,
    /// Soft ceiling for the local map.
    pub cache_max_entries: usize,
    pub key_prefix: String,
    pub key_salt: Option<String>,
    /// Lifetime of cached AI responses.
    #[serde(with = "duration_secs")]
    pub response_ttl: Duration,
    /// Let a second concurrent miss on the same key wait for the first.
    pub coalesce_misses: bool,
    pub rate_limits: RateLimiterConfig,
    pub retry: RetryConfig,
    pub provider: GeminiConfig,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            cache_timeout: Duration::from_millis(250),
            cache_max_entries: 1000,
            key_prefix: "vision_u".to_string(),
            key_salt: None,
            response_ttl: Duration::from_secs(3600),
            coalesce_misses: false,
            rate_limits: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            provider: GeminiConfig::default(),
        }
    }
}

impl MediatorConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay environment variables onto this configuration.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Ok(key) = env::var("API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Ok(model) = env::var("AI_MODEL") {
            self.provider.model = model;
        }
        if let Ok(base) = env::var("AI_BASE_URL") {
            self.provider.base_url = base;
        }
        if let Some(v) = env_parse::<u64>("VISION_RATE_LIMIT_USER")? {
            self.rate_limits.authenticated_per_hour = v;
        }
        if let Some(v) = env_parse::<u64>("VISION_RATE_LIMIT_ANON")? {
            self.rate_limits.anonymous_per_hour = v;
        }
        if let Some(v) = env_parse::<bool>("VISION_RATE_LIMIT_FAIL_CLOSED")? {
            self.rate_limits.on_backend_error = if v {
                FailurePolicy::Closed
            } else {
                FailurePolicy::Open
            };
        }
        if let Some(v) = env_parse::<u64>("VISION_RESPONSE_TTL_SECS")? {
            self.response_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("VISION_MAX_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("VISION_RETRY_BASE_MS")? {
            self.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("VISION_ATTEMPT_TIMEOUT_SECS")? {
            self.retry.attempt_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("VISION_CACHE_MAX_ENTRIES")? {
            self.cache_max_entries = v;
        }
        if let Some(v) = env_parse::<u64>("VISION_CACHE_TIMEOUT_MS")? {
            self.cache_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<bool>("VISION_COALESCE_MISSES")? {
            self.coalesce_misses = v;
        }
        Ok(())
    }

    /// The remote store URL, if one is really configured.
    pub fn remote_url(&self) -> Option<&str> {
        self.redis_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty() && *u != "memory://")
    }

    pub fn validate(&self) -> Result<()> {
        if self.response_ttl.is_zero() {
            return Err(invalid("response_ttl", "must be strictly positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "at least one attempt is required"));
        }
        if self.retry.attempt_timeout.is_zero() {
            return Err(invalid("retry.attempt_timeout", "must be strictly positive"));
        }
        if self.cache_timeout.is_zero() {
            return Err(invalid("cache_timeout", "must be strictly positive"));
        }
        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries", "must be at least 1"));
        }
        if self.rate_limits.authenticated_per_hour < self.rate_limits.anonymous_per_hour {
            return Err(invalid(
                "rate_limits.authenticated_per_hour",
                format!(
                    "authenticated ceiling ({}) must not be below anonymous ceiling ({})",
                    self.rate_limits.authenticated_per_hour, self.rate_limits.anonymous_per_hour
                ),
            ));
        }
        if let Some(url) = self.remote_url() {
            url::Url::parse(url).map_err(|e| invalid("redis_url", e.to_string()))?;
        }
        Ok(())
    }
}

fn invalid(field: &str, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        "invalid mediator configuration",
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config_loader"),
    )
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot parse {}", name),
                ErrorContext::new()
                    .with_field_path(name)
                    .with_details(e.to_string())
                    .with_source("env"),
            )
        }),
        Err(_) => Ok(None),
    }
}
