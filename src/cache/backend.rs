//! Cache backend trait and the in-process implementation.

use super::{CacheError, CacheResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage primitive behind [`super::CacheManager`].
///
/// Keys arrive fully qualified (prefix and namespace already applied).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<bool>;
    /// Increment the decimal counter under `key` unless it already holds
    /// `ceiling` or more. Returns `(incremented, value_before)`.
    ///
    /// Must be atomic per key. `ttl` applies only when the counter is created.
    async fn incr_if_below(&self, key: &str, ceiling: u64, ttl: Duration)
        -> CacheResult<(bool, u64)>;
    async fn clear(&self) -> CacheResult<()>;
    fn kind(&self) -> BackendKind;
    /// Number of entries held in process memory (expired ones included until purged).
    fn local_entry_count(&self) -> usize {
        0
    }
}

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
    /// Written by `incr_if_below`; only ever removed by expiry.
    counter: bool,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
            counter: false,
        }
    }
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded in-process map with per-entry expiry.
///
/// The bound is soft: a write may push the map over `max_entries`, after which
/// expired entries are purged first and only then the plain entries closest
/// to expiry are dropped. Counters are never evicted for size, and neither is
/// the key the current operation wrote.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, CacheEntry>, written: &str) {
        if entries.len() <= self.max_entries {
            return;
        }
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let mut evicted = 0usize;
        while entries.len() > self.max_entries {
            let soonest = entries
                .iter()
                .filter(|(k, e)| !e.counter && k.as_str() != written)
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match soonest {
                Some(k) => {
                    entries.remove(&k);
                    evicted += 1;
                }
                None => break,
            }
        }
        tracing::debug!(
            purged = before - entries.len() - evicted,
            evicted,
            remaining = entries.len(),
            "memory cache eviction pass"
        );
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        self.evict_if_needed(&mut entries, key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        Ok(entries
            .remove(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn incr_if_below(
        &self,
        key: &str,
        ceiling: u64,
        ttl: Duration,
    ) -> CacheResult<(bool, u64)> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        let mut entries = self.lock()?;
        let now = Instant::now();
        let live = entries.get(key).filter(|e| !e.is_expired(now));
        let (before, expires_at) = match live {
            Some(entry) => {
                let n = std::str::from_utf8(&entry.data)
                    .ok()
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .ok_or_else(|| CacheError::CorruptCounter {
                        key: key.to_string(),
                    })?;
                (n, entry.expires_at)
            }
            None => (0, now + ttl),
        };
        if before >= ceiling {
            return Ok((false, before));
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                data: (before + 1).to_string().into_bytes(),
                expires_at,
                counter: true,
            },
        );
        self.evict_if_needed(&mut entries, key);
        Ok((true, before))
    }

    async fn clear(&self) -> CacheResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn local_entry_count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new(10);
        cache.set("a", b"1", Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("a").await.unwrap(), Some(b"1".to_vec()));
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        // lazily purged on read
        assert_eq!(cache.local_entry_count(), 0);
    }

    #[tokio::test]
    async fn zero_ttl_rejected() {
        let cache = MemoryCache::new(10);
        assert!(matches!(
            cache.set("a", b"1", Duration::ZERO).await,
            Err(CacheError::InvalidTtl)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_prefers_expired_entries() {
        let cache = MemoryCache::new(3);
        cache.set("short-1", b"x", Duration::from_secs(1)).await.unwrap();
        cache.set("short-2", b"x", Duration::from_secs(1)).await.unwrap();
        cache.set("long-1", b"x", Duration::from_secs(100)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set("long-2", b"x", Duration::from_secs(100)).await.unwrap();
        // both expired entries purged, nothing live evicted
        assert_eq!(cache.local_entry_count(), 2);
        assert!(cache.get("long-1").await.unwrap().is_some());
        assert!(cache.get("long-2").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn size_eviction_drops_soonest_expiry() {
        let cache = MemoryCache::new(2);
        cache.set("a", b"x", Duration::from_secs(10)).await.unwrap();
        cache.set("b", b"x", Duration::from_secs(50)).await.unwrap();
        cache.set("c", b"x", Duration::from_secs(30)).await.unwrap();
        assert_eq!(cache.local_entry_count(), 2);
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let cache = MemoryCache::new(10);
        cache.set("a", b"1", Duration::from_secs(5)).await.unwrap();
        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn counter_stops_at_ceiling_and_keeps_window_expiry() {
        let cache = MemoryCache::new(10);
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.incr_if_below("c", 2, ttl).await.unwrap(), (true, 0));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.incr_if_below("c", 2, ttl).await.unwrap(), (true, 1));
        assert_eq!(cache.incr_if_below("c", 2, ttl).await.unwrap(), (false, 2));
        // expiry is anchored at creation, not at the last increment
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.incr_if_below("c", 2, ttl).await.unwrap(), (true, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn full_map_keeps_counters_and_the_written_key() {
        let cache = MemoryCache::new(2);
        let hour = Duration::from_secs(3600);
        cache.set("resp-1", b"x", hour).await.unwrap();
        cache.set("resp-2", b"x", hour).await.unwrap();

        // the counter expires before either response
        let window = Duration::from_secs(45 * 60);
        for n in 0..5 {
            assert_eq!(cache.incr_if_below("rl", 5, window).await.unwrap(), (true, n));
        }
        assert_eq!(cache.incr_if_below("rl", 5, window).await.unwrap(), (false, 5));
        assert_eq!(cache.local_entry_count(), 2);
        assert_eq!(cache.get("rl").await.unwrap(), Some(b"5".to_vec()));

        // a short-lived response written into a full map is not evicted by its own write
        cache.set("resp-3", b"y", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.get("resp-3").await.unwrap(), Some(b"y".to_vec()));
        assert_eq!(cache.get("rl").await.unwrap(), Some(b"5".to_vec()));
        assert_eq!(cache.local_entry_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn counters_only_leave_by_expiry() {
        let cache = MemoryCache::new(1);
        let window = Duration::from_secs(60);
        cache.incr_if_below("a", 5, window).await.unwrap();
        cache.incr_if_below("b", 5, window).await.unwrap();
        // soft bound exceeded rather than dropping a live counter
        assert_eq!(cache.local_entry_count(), 2);
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.incr_if_below("c", 5, window).await.unwrap();
        assert_eq!(cache.local_entry_count(), 1);
    }

    #[tokio::test]
    async fn counter_rejects_non_numeric_value() {
        let cache = MemoryCache::new(10);
        cache.set("c", b"\"text\"", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            cache.incr_if_below("c", 5, Duration::from_secs(5)).await,
            Err(CacheError::CorruptCounter { .. })
        ));
    }
}
