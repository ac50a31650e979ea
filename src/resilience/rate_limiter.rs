use crate::cache::{namespaces, CacheManager};
use crate::clock::{next_hour, Clock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which ceiling applies to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityClass {
    Authenticated,
    Anonymous,
}

impl IdentityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::Authenticated => "authenticated",
            IdentityClass::Anonymous => "anonymous",
        }
    }

    fn key_segment(&self) -> &'static str {
        match self {
            IdentityClass::Authenticated => "user",
            IdentityClass::Anonymous => "ip",
        }
    }
}

impl std::fmt::Display for IdentityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub identity_class: IdentityClass,
    pub limit: u64,
    /// Requests already counted in this window before this one was judged.
    pub current: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Requests still available in this window after this decision.
    pub fn remaining(&self) -> u64 {
        let used = if self.allowed {
            self.current + 1
        } else {
            self.current
        };
        self.limit.saturating_sub(used)
    }
}

/// What to do when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request.
    #[default]
    Open,
    /// Reject the request.
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub authenticated_per_hour: u64,
    pub anonymous_per_hour: u64,
    pub on_backend_error: FailurePolicy,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            authenticated_per_hour: 10,
            anonymous_per_hour: 5,
            on_backend_error: FailurePolicy::Open,
        }
    }
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ceilings(mut self, authenticated: u64, anonymous: u64) -> Self {
        self.authenticated_per_hour = authenticated;
        self.anonymous_per_hour = anonymous;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_backend_error = policy;
        self
    }

    pub fn ceiling(&self, class: IdentityClass) -> u64 {
        match class {
            IdentityClass::Authenticated => self.authenticated_per_hour,
            IdentityClass::Anonymous => self.anonymous_per_hour,
        }
    }
}

/// Fixed-window hourly limiter.
///
/// - One counter per identity per UTC clock hour
/// - Counters expire at the end of their hour through the cache TTL
/// - Up to twice the ceiling can pass around an hour boundary
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    cache: Arc<CacheManager>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig, cache: Arc<CacheManager>, clock: Arc<dyn Clock>) -> Self {
        Self { cfg, cache, clock }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    pub fn window_key(class: IdentityClass, identity_key: &str, at: DateTime<Utc>) -> String {
        format!(
            "rate_limit:{}:{}:{}",
            class.key_segment(),
            identity_key,
            at.format("%Y%m%d%H")
        )
    }

    /// Judge one request and, if allowed, count it. Rejected requests do not
    /// consume budget.
    pub async fn check_and_increment(
        &self,
        class: IdentityClass,
        identity_key: &str,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        let reset_at = next_hour(now);
        let limit = self.cfg.ceiling(class);
        let key = Self::window_key(class, identity_key, now);
        let ttl = (reset_at - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1))
            .max(Duration::from_millis(1));

        match self
            .cache
            .incr_if_below(&key, namespaces::RATE_LIMITS, limit, ttl)
            .await
        {
            Ok((allowed, current)) => {
                if !allowed {
                    tracing::info!(
                        identity_class = %class,
                        limit,
                        current,
                        "rate limit reached"
                    );
                }
                RateLimitDecision {
                    allowed,
                    identity_class: class,
                    limit,
                    current,
                    reset_at,
                }
            }
            Err(e) => {
                let allowed = self.cfg.on_backend_error == FailurePolicy::Open;
                tracing::warn!(
                    identity_class = %class,
                    error = %e,
                    allowed,
                    "rate limit store unavailable"
                );
                RateLimitDecision {
                    allowed,
                    identity_class: class,
                    limit,
                    current: if allowed { 0 } else { limit },
                    reset_at,
                }
            }
        }
    }

    /// Current window usage without counting a request.
    pub async fn peek(&self, class: IdentityClass, identity_key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let limit = self.cfg.ceiling(class);
        let key = Self::window_key(class, identity_key, now);
        let current = self.cache.read_counter(&key, namespaces::RATE_LIMITS).await;
        RateLimitDecision {
            allowed: current < limit,
            identity_class: class,
            limit,
            current,
            reset_at: next_hour(now),
        }
    }
}
