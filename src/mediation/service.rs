use super::types::{CachedGuidance, Identity, InvocationResult, ResultMetadata};
use super::usage::{daily_key, until_end_of_day, UsageStats};
use crate::cache::{namespaces, CacheKeyGenerator, CacheManager, CacheStats};
use crate::clock::Clock;
use crate::prompt::{career_prompt, GuidanceRequest, Profile};
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::RetryingInvoker;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Per-key async locks so concurrent misses on one key make one provider call.
#[derive(Default)]
pub(crate) struct InflightLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InflightLocks {
    /// Claim the slot for `key`. The returned handle gives the slot back when
    /// dropped, including when the owning `obtain` future is cancelled.
    fn claim<'a>(&'a self, key: &str) -> InflightSlot<'a> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let slot = slots.entry(key.to_string()).or_default().clone();
        InflightSlot {
            locks: self,
            key: key.to_string(),
            slot: Some(slot),
        }
    }

    fn release(&self, key: &str, slot: Arc<AsyncMutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        // the map and `slot` itself
        if Arc::strong_count(&slot) <= 2 {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

struct InflightSlot<'a> {
    locks: &'a InflightLocks,
    key: String,
    slot: Option<Arc<AsyncMutex<()>>>,
}

impl InflightSlot<'_> {
    fn mutex(&self) -> &AsyncMutex<()> {
        match self.slot {
            Some(ref slot) => slot,
            None => unreachable!("slot is only taken in drop"),
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.locks.release(&self.key, slot);
        }
    }
}

/// Entry point between request handlers and the AI provider.
///
/// Built once at startup with [`super::MediatorBuilder`] and shared through
/// `Arc`; owns no per-request state.
pub struct Mediator {
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) limiter: RateLimiter,
    pub(crate) invoker: RetryingInvoker,
    pub(crate) keys: CacheKeyGenerator,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) response_ttl: Duration,
    pub(crate) inflight: Option<InflightLocks>,
}

impl Mediator {
    /// Rate check, cache lookup, then (on a miss) a retried provider call
    /// whose result is written through before returning.
    pub async fn obtain(
        &self,
        identity: &Identity,
        profile: &Profile,
        goal: &str,
    ) -> Result<InvocationResult> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "obtain",
            %request_id,
            identity_class = %identity.class()
        );
        self.obtain_inner(request_id, identity, profile, goal)
            .instrument(span)
            .await
    }

    async fn obtain_inner(
        &self,
        request_id: Uuid,
        identity: &Identity,
        profile: &Profile,
        goal: &str,
    ) -> Result<InvocationResult> {
        let started = Instant::now();

        let decision = self
            .limiter
            .check_and_increment(identity.class(), identity.key())
            .await;
        if !decision.allowed {
            return Err(Error::RateLimitExceeded { decision });
        }
        self.record_usage(identity).await;

        let key = self
            .keys
            .make_key(namespaces::AI_RESPONSES, &GuidanceRequest { profile, goal });

        if let Some(hit) = self.lookup(&key.hash).await {
            return Ok(self.from_cache(request_id, hit, started));
        }

        match self.inflight {
            Some(ref locks) => {
                let slot = locks.claim(&key.hash);
                let _guard = slot.mutex().lock().await;
                match self.lookup(&key.hash).await {
                    Some(hit) => {
                        tracing::debug!("served by concurrent request");
                        Ok(self.from_cache(request_id, hit, started))
                    }
                    None => {
                        self.invoke_and_store(request_id, &key.hash, profile, goal, started)
                            .await
                    }
                }
            }
            None => {
                self.invoke_and_store(request_id, &key.hash, profile, goal, started)
                    .await
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<CachedGuidance> {
        self.cache
            .get::<CachedGuidance>(key, namespaces::AI_RESPONSES)
            .await
    }

    fn from_cache(&self, request_id: Uuid, hit: CachedGuidance, started: Instant) -> InvocationResult {
        tracing::info!("ai response served from cache");
        InvocationResult {
            metadata: ResultMetadata {
                request_id,
                latency_seconds: started.elapsed().as_secs_f64(),
                attempt_count: 0,
                cache_hit: true,
                generated_at: hit.generated_at,
                model: hit.model,
                prompt_length: hit.prompt_length,
                response_length: hit.text.len(),
            },
            text: hit.text,
        }
    }

    async fn invoke_and_store(
        &self,
        request_id: Uuid,
        key: &str,
        profile: &Profile,
        goal: &str,
        started: Instant,
    ) -> Result<InvocationResult> {
        let prompt = career_prompt(profile, goal);
        let invocation = self.invoker.invoke(&prompt).await?;

        let cached = CachedGuidance {
            text: invocation.text,
            model: self.invoker.model().to_string(),
            generated_at: self.clock.now(),
            prompt_length: prompt.len(),
        };
        if let Err(e) = self
            .cache
            .set(key, &cached, self.response_ttl, namespaces::AI_RESPONSES)
            .await
        {
            tracing::warn!(error = %e, "ai response not cached");
        }

        let latency_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            attempts = invocation.attempts,
            provider_ms = invocation.latency.as_millis() as u64,
            "ai response generated in {:.2}s",
            latency_seconds
        );

        Ok(InvocationResult {
            metadata: ResultMetadata {
                request_id,
                latency_seconds,
                attempt_count: invocation.attempts,
                cache_hit: false,
                generated_at: cached.generated_at,
                model: cached.model,
                prompt_length: cached.prompt_length,
                response_length: cached.text.len(),
            },
            text: cached.text,
        })
    }

    async fn record_usage(&self, identity: &Identity) {
        let now = self.clock.now();
        if let Err(e) = self
            .cache
            .incr_if_below(
                &daily_key(identity, now),
                namespaces::USAGE_STATS,
                u64::MAX,
                until_end_of_day(now),
            )
            .await
        {
            tracing::debug!(error = %e, "usage counter not updated");
        }
    }

    /// Requests counted for `identity` this hour and today.
    pub async fn usage(&self, identity: &Identity) -> UsageStats {
        let now = self.clock.now();
        let window = self.limiter.peek(identity.class(), identity.key()).await;
        let requests_today = self
            .cache
            .read_counter(&daily_key(identity, now), namespaces::USAGE_STATS)
            .await;
        UsageStats {
            identity_class: identity.class(),
            hour: now.format("%H:00").to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            requests_this_hour: window.current,
            hourly_limit: window.limit,
            requests_today,
        }
    }

    /// Drop the cached response for one profile and goal.
    pub async fn invalidate(&self, profile: &Profile, goal: &str) -> Result<bool> {
        let key = self
            .keys
            .make_key(namespaces::AI_RESPONSES, &GuidanceRequest { profile, goal });
        Ok(self.cache.delete(&key.hash, namespaces::AI_RESPONSES).await?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn model(&self) -> &str {
        self.invoker.model()
    }
}
