//! Redis-backed cache store.
//!
//! Every command is bounded by `timeout`; the connection manager reconnects
//! on its own, so a dead Redis shows up as per-operation failures that the
//! [`super::CacheManager`] turns into misses.

use super::backend::{BackendKind, CacheBackend};
use super::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};
use std::future::Future;
use std::time::Duration;

/// Atomic check-and-increment: KEYS[1] counter, ARGV[1] ceiling, ARGV[2] ttl in ms.
/// Replies `{incremented, value_before}`.
const INCR_IF_BELOW: &str = r#"
local raw = redis.call('GET', KEYS[1])
local current = 0
if raw then
  current = tonumber(raw)
  if current == nil then
    return redis.error_reply('corrupt counter')
  end
end
if current >= tonumber(ARGV[1]) then
  return {0, current}
end
redis.call('INCR', KEYS[1])
if current == 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return {1, current}
"#;

pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
    incr_script: Script,
    key_prefix: Option<String>,
}

impl RedisCache {
    /// Connect and verify the server answers `PING` within `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(timeout))??;
        let pong: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| CacheError::Timeout(timeout))??;
        tracing::info!(reply = %pong, "redis cache connected");
        Ok(Self::from_connection(conn, timeout))
    }

    pub fn from_connection(conn: ConnectionManager, timeout: Duration) -> Self {
        Self {
            conn,
            timeout,
            incr_script: Script::new(INCR_IF_BELOW),
            key_prefix: None,
        }
    }

    /// Scope [`CacheBackend::clear`] to keys under `prefix:`. Without a prefix
    /// `clear` is refused.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    async fn bounded<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
            .map_err(CacheError::from)
    }
}

fn ttl_millis(ttl: Duration) -> CacheResult<u64> {
    if ttl.is_zero() {
        return Err(CacheError::InvalidTtl);
    }
    Ok((ttl.as_millis() as u64).max(1))
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let v: Option<Vec<u8>> = conn.get(key).await?;
            Ok(v)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let ms = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let _: () = conn.pset_ex(key, value, ms).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let removed: u64 = conn.del(key).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn incr_if_below(
        &self,
        key: &str,
        ceiling: u64,
        ttl: Duration,
    ) -> CacheResult<(bool, u64)> {
        let ms = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ceiling).arg(ms);
        let (incremented, before) = self
            .bounded(async move {
                let reply: RedisResult<(i64, u64)> = invocation.invoke_async(&mut conn).await;
                reply
            })
            .await?;
        Ok((incremented == 1, before))
    }

    async fn clear(&self) -> CacheResult<()> {
        let pattern = clear_pattern(self.key_prefix.as_deref())?;
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await?;
                if !keys.is_empty() {
                    let _: u64 = conn.del(keys).await?;
                }
                if next == 0 {
                    return Ok(());
                }
                cursor = next;
            }
        })
        .await
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}

const SCAN_BATCH: u64 = 500;

fn clear_pattern(prefix: Option<&str>) -> CacheResult<String> {
    match prefix.map(str::trim) {
        Some(p) if !p.is_empty() => Ok(format!("{}:*", p)),
        _ => Err(CacheError::UnscopedClear),
    }
}
