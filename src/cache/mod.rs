//! 响应缓存模块：本地内存或 Redis 双后端，带命名空间、TTL 与统计。
//!
//! # Response Caching Module
//!
//! This module provides the cache store shared by AI responses, rate-limit
//! counters and usage counters. One backend is chosen at construction time;
//! callers only see [`CacheManager`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Namespacing, JSON values, statistics, fail-open reads |
//! | [`CacheBackend`] | Trait implemented by each storage backend |
//! | [`MemoryCache`] | Bounded in-process map with per-entry expiry |
//! | [`RedisCache`] | Remote Redis store with per-operation timeouts |
//! | [`CacheKeyGenerator`] | SHA-256 keys from structured inputs |
//!
//! ## Example
//!
//! ```rust
//! use vision_mediator::cache::{CacheConfig, CacheManager, MemoryCache, namespaces};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let cache = CacheManager::new(CacheConfig::default(), Box::new(MemoryCache::new(1000)));
//! cache
//!     .set("k", &"v".to_string(), Duration::from_secs(60), namespaces::AI_RESPONSES)
//!     .await
//!     .ok();
//! let v: Option<String> = cache.get("k", namespaces::AI_RESPONSES).await;
//! assert_eq!(v.as_deref(), Some("v"));
//! # }
//! ```
//!
//! ## Physical keys
//!
//! Every stored key is `"{prefix}:{namespace}:{key}"`, so responses and
//! counters sharing one Redis database can never collide.

mod backend;
mod key;
mod manager;
mod remote;

pub use backend::{BackendKind, CacheBackend, MemoryCache};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheManager, CacheStats};
pub use remote::RedisCache;

use thiserror::Error;

/// Well-known namespaces.
pub mod namespaces {
    pub const AI_RESPONSES: &str = "ai_responses";
    pub const RATE_LIMITS: &str = "rate_limits";
    pub const USAGE_STATS: &str = "usage_stats";
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("TTL must be strictly positive")]
    InvalidTtl,

    #[error("Value serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt counter value under {key}")]
    CorruptCounter { key: String },

    #[error("Cache store lock poisoned")]
    Poisoned,

    #[error("Refusing to clear a shared store without a key prefix")]
    UnscopedClear,
}
