//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vision_mediator::cache::{BackendKind, CacheBackend, CacheError, CacheResult, MemoryCache};
use vision_mediator::clock::ManualClock;
use vision_mediator::provider::ErrorClass;
use vision_mediator::resilience::retry::RetryConfig;
use vision_mediator::{Mediator, MediatorBuilder, MediatorConfig, Profile, Provider, ProviderError};

/// Provider that replays a script of outcomes, then repeats `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Result<String, ProviderError>,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn always(text: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), Ok(text.to_string()))
    }

    pub fn always_failing(err: ProviderError) -> Arc<Self> {
        Self::scripted(Vec::new(), Err(err))
    }

    pub fn scripted(
        script: Vec<Result<String, ProviderError>>,
        fallback: Result<String, ProviderError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        })
    }

    pub fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(text.to_string()),
            delay,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

/// Backend whose every operation fails, as a dead Redis would.
pub struct UnreachableBackend;

#[async_trait]
impl CacheBackend for UnreachableBackend {
    async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Timeout(Duration::from_millis(250)))
    }
    async fn set(&self, _: &str, _: &[u8], _: Duration) -> CacheResult<()> {
        Err(CacheError::Timeout(Duration::from_millis(250)))
    }
    async fn delete(&self, _: &str) -> CacheResult<bool> {
        Err(CacheError::Timeout(Duration::from_millis(250)))
    }
    async fn incr_if_below(&self, _: &str, _: u64, _: Duration) -> CacheResult<(bool, u64)> {
        Err(CacheError::Timeout(Duration::from_millis(250)))
    }
    async fn clear(&self) -> CacheResult<()> {
        Err(CacheError::Timeout(Duration::from_millis(250)))
    }
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}

pub fn transient() -> ProviderError {
    ProviderError::from_status(503, "model overloaded")
}

pub fn permanent() -> ProviderError {
    ProviderError::new(ErrorClass::Authentication, "API key not valid")
}

pub fn ana() -> Profile {
    Profile::new("Ana", 20, "BSc", "data", "chess")
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 12, 15, 0).unwrap()
}

pub fn fast_config() -> MediatorConfig {
    MediatorConfig {
        retry: RetryConfig::default()
            .with_base_delay(Duration::from_millis(10))
            .with_jitter(false),
        ..MediatorConfig::default()
    }
}

pub async fn mediator_with(
    config: MediatorConfig,
    provider: Arc<ScriptedProvider>,
    clock: Arc<ManualClock>,
) -> Mediator {
    MediatorBuilder::new()
        .config(config)
        .provider(provider)
        .cache_backend(Box::new(MemoryCache::new(1000)))
        .clock(clock)
        .build()
        .await
        .expect("mediator builds")
}
