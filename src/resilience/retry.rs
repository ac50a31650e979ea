//! Retrying invoker
//!
//! Wraps one provider call with bounded exponential backoff. Only transient
//! failures are retried; permanent ones return after the attempt that saw them.

use crate::provider::{Provider, ProviderError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Duration, Instant};

/// Configuration for retry logic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    #[serde(with = "crate::config::duration_millis")]
    pub base_delay: Duration,
    #[serde(with = "crate::config::duration_millis")]
    pub max_delay: Duration,
    pub jitter: bool,
    /// Upper bound for a single provider call.
    #[serde(with = "crate::config::duration_millis")]
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_jitter(mut self, enable: bool) -> Self {
        self.jitter = enable;
        self
    }

    pub fn with_attempt_timeout(mut self, d: Duration) -> Self {
        self.attempt_timeout = d;
        self
    }

    /// Delay after the `failed`-th failed attempt (1-based), before jitter:
    /// `base_delay * 2^(failed-1)`, capped at `max_delay`.
    pub fn backoff(&self, failed: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(failed.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(cap))
    }

    /// Backoff with "equal jitter": half fixed, half random.
    fn delay_for(&self, failed: u32) -> Duration {
        let delay = self.backoff(failed);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay.as_millis() as u64 / 2;
        let spread = rand::rng().random_range(0..=half);
        Duration::from_millis(delay.as_millis() as u64 - half + spread)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationErrorKind {
    /// Retryable failure; only seen in logs while attempts remain.
    Transient,
    /// Not worth retrying (bad request, credentials, unusable output).
    Permanent,
    /// Every attempt failed transiently.
    Exhausted,
}

impl InvocationErrorKind {
    pub fn of(cause: &ProviderError) -> Self {
        if cause.is_transient() {
            InvocationErrorKind::Transient
        } else {
            InvocationErrorKind::Permanent
        }
    }

    /// Whether trying again later might succeed.
    pub fn is_retry_later(&self) -> bool {
        !matches!(self, InvocationErrorKind::Permanent)
    }
}

impl std::fmt::Display for InvocationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InvocationErrorKind::Transient => "transient",
            InvocationErrorKind::Permanent => "permanent",
            InvocationErrorKind::Exhausted => "exhausted",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} failure after {attempts} attempt(s): {cause}")]
pub struct InvocationError {
    pub kind: InvocationErrorKind,
    pub attempts: u32,
    /// Failure of the last attempt.
    pub cause: ProviderError,
    /// Wall-clock time spent across all attempts.
    pub elapsed: Duration,
}

/// Successful provider call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub text: String,
    pub attempts: u32,
    pub latency: Duration,
}

pub struct RetryingInvoker {
    config: RetryConfig,
    provider: Arc<dyn Provider>,
}

impl RetryingInvoker {
    pub fn new(config: RetryConfig, provider: Arc<dyn Provider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn invoke(&self, prompt: &str) -> Result<Invocation, InvocationError> {
        let max_attempts = self.config.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let attempt_started = Instant::now();
            let outcome = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.provider.generate(prompt),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(ProviderError::timeout(format!(
                    "no response within {:?}",
                    self.config.attempt_timeout
                ))),
            };
            let attempt_ms = attempt_started.elapsed().as_millis() as u64;

            let cause = match outcome {
                Ok(text) => {
                    let latency = started.elapsed();
                    tracing::debug!(attempt, attempt_ms, "provider call succeeded");
                    return Ok(Invocation {
                        text,
                        attempts: attempt,
                        latency,
                    });
                }
                Err(e) => e,
            };

            let kind = InvocationErrorKind::of(&cause);
            if kind == InvocationErrorKind::Permanent {
                tracing::warn!(attempt, attempt_ms, error = %cause, "provider call failed permanently");
                return Err(InvocationError {
                    kind,
                    attempts: attempt,
                    cause,
                    elapsed: started.elapsed(),
                });
            }
            if attempt >= max_attempts {
                tracing::error!(attempts = attempt, error = %cause, "provider retries exhausted");
                return Err(InvocationError {
                    kind: InvocationErrorKind::Exhausted,
                    attempts: attempt,
                    cause,
                    elapsed: started.elapsed(),
                });
            }

            let delay = self.config.delay_for(attempt);
            tracing::warn!(
                attempt,
                attempt_ms,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                error = %cause,
                "provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = RetryConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            ..RetryConfig::default()
        };
        assert_eq!(cfg.backoff(1), Duration::from_millis(1000));
        assert_eq!(cfg.backoff(2), Duration::from_millis(2000));
        assert_eq!(cfg.backoff(3), Duration::from_millis(4000));
        assert_eq!(cfg.backoff(4), Duration::from_millis(5000));
        assert_eq!(cfg.backoff(80), Duration::from_millis(5000));
    }

    #[test]
    fn jitter_stays_within_half_band() {
        let cfg = RetryConfig::default().with_jitter(true);
        for _ in 0..100 {
            let d = cfg.delay_for(2);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(2000));
        }
        let cfg = cfg.with_jitter(false);
        assert_eq!(cfg.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn kinds_classify_cause() {
        let t = ProviderError::from_status(503, "busy");
        let p = ProviderError::from_status(401, "bad key");
        assert_eq!(InvocationErrorKind::of(&t), InvocationErrorKind::Transient);
        assert_eq!(InvocationErrorKind::of(&p), InvocationErrorKind::Permanent);
        assert!(InvocationErrorKind::Exhausted.is_retry_later());
        assert!(!InvocationErrorKind::Permanent.is_retry_later());
    }
}
