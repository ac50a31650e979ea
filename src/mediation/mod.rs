//! 请求中介模块：限流 → 缓存查询 → 重试调用 → 写穿缓存。
//!
//! # Mediation Module
//!
//! [`Mediator::obtain`] runs one request through the layer:
//!
//! 1. **Rate check**: the caller's identity class picks a ceiling; a
//!    rejection returns [`crate::Error::RateLimitExceeded`] before any cache or
//!    provider work.
//! 2. **Cache lookup**: keyed by profile and goal only, so identical
//!    requests from different callers share one entry.
//! 3. **Invoke**: on a miss the prompt goes through the
//!    [`crate::resilience::retry::RetryingInvoker`].
//! 4. **Write through**: a successful response is cached before returning;
//!    failures are never cached.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vision_mediator::{Identity, MediatorBuilder, MediatorConfig, Profile};
//!
//! # async fn demo() -> vision_mediator::Result<()> {
//! let mediator = MediatorBuilder::new()
//!     .config(MediatorConfig::from_env()?)
//!     .build()
//!     .await?;
//!
//! let profile = Profile::new("Ana", 20, "BSc", "data", "chess");
//! let result = mediator
//!     .obtain(&Identity::anonymous("203.0.113.7"), &profile, "become a data analyst")
//!     .await?;
//! println!("{} (cache hit: {})", result.text, result.metadata.cache_hit);
//! # Ok(())
//! # }
//! ```

mod builder;
mod service;
mod types;
mod usage;

pub use builder::MediatorBuilder;
pub use service::Mediator;
pub use types::{Identity, InvocationResult, ResultMetadata};
pub use usage::UsageStats;
