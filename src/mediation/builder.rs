use super::service::{InflightLocks, Mediator};
use crate::cache::{
    CacheBackend, CacheConfig, CacheKeyGenerator, CacheManager, MemoryCache, RedisCache,
};
use crate::clock::{Clock, SystemClock};
use crate::config::MediatorConfig;
use crate::provider::{GeminiProvider, Provider};
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::RetryingInvoker;
use crate::Result;
use std::sync::Arc;

/// Builder for the process-wide [`Mediator`].
///
/// Anything not injected is derived from the configuration: the cache
/// backend from `redis_url`, the provider from `provider`.
pub struct MediatorBuilder {
    config: MediatorConfig,
    provider: Option<Arc<dyn Provider>>,
    backend: Option<Box<dyn CacheBackend>>,
    clock: Arc<dyn Clock>,
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self {
            config: MediatorConfig::default(),
            provider: None,
            backend: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: MediatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject the AI provider (stubs in tests, alternative vendors).
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Inject a cache backend instead of deriving one from `redis_url`.
    pub fn cache_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn build(self) -> Result<Mediator> {
        let config = self.config;
        config.validate()?;

        let backend = match self.backend {
            Some(b) => b,
            None => Self::connect_backend(&config).await,
        };
        tracing::info!(backend = %backend.kind(), "cache backend selected");

        let cache = Arc::new(CacheManager::new(
            CacheConfig {
                default_ttl: config.response_ttl,
                key_prefix: config.key_prefix.clone(),
                ..CacheConfig::default()
            },
            backend,
        ));

        let provider: Arc<dyn Provider> = match self.provider {
            Some(p) => p,
            None => Arc::new(GeminiProvider::new(&config.provider)?),
        };

        let mut keys = CacheKeyGenerator::new();
        if let Some(ref salt) = config.key_salt {
            keys = keys.with_salt(salt.clone());
        }

        Ok(Mediator {
            limiter: RateLimiter::new(
                config.rate_limits.clone(),
                cache.clone(),
                self.clock.clone(),
            ),
            invoker: RetryingInvoker::new(config.retry.clone(), provider),
            cache,
            keys,
            clock: self.clock,
            response_ttl: config.response_ttl,
            inflight: config.coalesce_misses.then(InflightLocks::default),
        })
    }

    async fn connect_backend(config: &MediatorConfig) -> Box<dyn CacheBackend> {
        if let Some(url) = config.remote_url() {
            match RedisCache::connect(url, config.cache_timeout).await {
                Ok(redis) => return Box::new(redis.with_key_prefix(config.key_prefix.clone())),
                Err(e) => {
                    tracing::warn!(error = %e, "redis connection failed, using memory cache");
                }
            }
        }
        Box::new(MemoryCache::new(config.cache_max_entries))
    }
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
