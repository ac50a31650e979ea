//! Cache manager.

use super::backend::{BackendKind, CacheBackend};
use super::{CacheError, CacheResult};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub max_entry_size: usize,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_entry_size: 1024 * 1024,
            key_prefix: "vision_u".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub backend_kind: BackendKind,
    pub local_entry_count: usize,
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

/// Namespaced, JSON-valued front for a [`CacheBackend`].
///
/// Reads fail open: a backend error is logged, counted and reported as a miss.
/// Writes return their error so callers can decide, but nothing in the
/// mediation path lets one escape.
pub struct CacheManager {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl CacheManager {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str, namespace: &str) -> Option<T> {
        let full = self.full_key(key, namespace);
        match self.backend.get(&full).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(val) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(val)
                }
                Err(e) => {
                    tracing::warn!(namespace, error = %e, "undecodable cache entry treated as miss");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(namespace, backend = %self.backend.kind(), error = %e, "cache get failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        namespace: &str,
    ) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        let data = serde_json::to_vec(value)?;
        if data.len() > self.config.max_entry_size {
            tracing::debug!(namespace, size = data.len(), "entry above max_entry_size not cached");
            return Ok(());
        }
        let full = self.full_key(key, namespace);
        match self.backend.set(&full, &data, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(namespace, backend = %self.backend.kind(), error = %e, "cache set failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Store with [`CacheConfig::default_ttl`].
    pub async fn set_default<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        namespace: &str,
    ) -> CacheResult<()> {
        self.set(key, value, self.config.default_ttl, namespace).await
    }

    pub async fn delete(&self, key: &str, namespace: &str) -> CacheResult<bool> {
        let full = self.full_key(key, namespace);
        match self.backend.delete(&full).await {
            Ok(d) => {
                if d {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                }
                Ok(d)
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Atomic bounded counter increment; see [`CacheBackend::incr_if_below`].
    ///
    /// Not counted as a hit or miss.
    pub async fn incr_if_below(
        &self,
        key: &str,
        namespace: &str,
        ceiling: u64,
        ttl: Duration,
    ) -> CacheResult<(bool, u64)> {
        let full = self.full_key(key, namespace);
        self.backend
            .incr_if_below(&full, ceiling, ttl)
            .await
            .map_err(|e| {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                e
            })
    }

    /// Read a counter written by [`Self::incr_if_below`] without touching
    /// hit/miss statistics. Missing or unreadable counters read as zero.
    pub async fn read_counter(&self, key: &str, namespace: &str) -> u64 {
        let full = self.full_key(key, namespace);
        match self.backend.get(&full).await {
            Ok(Some(data)) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "counter read failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    pub async fn clear(&self) -> CacheResult<()> {
        self.backend.clear().await
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            sets: self.stats.sets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            backend_kind: self.backend.kind(),
            local_entry_count: self.backend.local_entry_count(),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    fn full_key(&self, key: &str, namespace: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, namespace, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCache;
    use async_trait::async_trait;

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Timeout(Duration::from_millis(50)))
        }
        async fn set(&self, _: &str, _: &[u8], _: Duration) -> CacheResult<()> {
            Err(CacheError::Timeout(Duration::from_millis(50)))
        }
        async fn delete(&self, _: &str) -> CacheResult<bool> {
            Err(CacheError::Timeout(Duration::from_millis(50)))
        }
        async fn incr_if_below(&self, _: &str, _: u64, _: Duration) -> CacheResult<(bool, u64)> {
            Err(CacheError::Timeout(Duration::from_millis(50)))
        }
        async fn clear(&self) -> CacheResult<()> {
            Ok(())
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Redis
        }
    }

    fn memory_manager() -> CacheManager {
        CacheManager::new(CacheConfig::default(), Box::new(MemoryCache::new(100)))
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let cache = memory_manager();
        let ttl = Duration::from_secs(60);
        cache.set("k", "response", ttl, "ai_responses").await.unwrap();
        cache.set("k", &3u64, ttl, "rate_limits").await.unwrap();
        assert_eq!(cache.get::<String>("k", "ai_responses").await.as_deref(), Some("response"));
        assert_eq!(cache.get::<u64>("k", "rate_limits").await, Some(3));
        assert!(cache.delete("k", "ai_responses").await.unwrap());
        assert_eq!(cache.get::<u64>("k", "rate_limits").await, Some(3));
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = memory_manager();
        assert!(cache.get::<String>("absent", "ns").await.is_none());
        cache.set_default("present", "v", "ns").await.unwrap();
        assert!(cache.get::<String>("present", "ns").await.is_some());
        assert!(cache.get::<String>("present", "ns").await.is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.backend_kind, BackendKind::Memory);
        assert_eq!(stats.local_entry_count, 1);
    }

    #[tokio::test]
    async fn backend_failure_reads_as_miss() {
        let cache = CacheManager::new(CacheConfig::default(), Box::new(BrokenBackend));
        assert!(cache.get::<String>("k", "ns").await.is_none());
        assert!(cache.set("k", "v", Duration::from_secs(1), "ns").await.is_err());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.local_entry_count, 0);
        assert_eq!(cache.read_counter("k", "ns").await, 0);
    }

    #[tokio::test]
    async fn zero_ttl_is_refused_before_backend() {
        let cache = memory_manager();
        assert!(matches!(
            cache.set("k", "v", Duration::ZERO, "ns").await,
            Err(CacheError::InvalidTtl)
        ));
        assert_eq!(cache.stats().errors, 0);
    }

    #[tokio::test]
    async fn oversized_entries_are_skipped() {
        let cache = CacheManager::new(
            CacheConfig {
                max_entry_size: 8,
                ..CacheConfig::default()
            },
            Box::new(MemoryCache::new(10)),
        );
        cache.set_default("k", "much longer than eight bytes", "ns").await.unwrap();
        assert!(cache.get::<String>("k", "ns").await.is_none());
    }

    #[tokio::test]
    async fn counters_read_back() {
        let cache = memory_manager();
        let ttl = Duration::from_secs(60);
        cache.incr_if_below("c", "rate_limits", 10, ttl).await.unwrap();
        cache.incr_if_below("c", "rate_limits", 10, ttl).await.unwrap();
        assert_eq!(cache.read_counter("c", "rate_limits").await, 2);
        assert_eq!(cache.read_counter("c", "usage_stats").await, 0);
        assert_eq!(cache.stats().hits, 0);
    }
}
