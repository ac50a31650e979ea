//! 弹性模块：按身份的固定窗口限流与带退避的重试调用。
//!
//! # Resilience Primitives Module
//!
//! Two guards around the expensive provider call:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Fixed-hour request ceilings per identity class |
//! | [`retry`] | Bounded exponential backoff for transient provider failures |
//!
//! ## Rate Limiter
//!
//! Counters live in the shared cache store under the `rate_limits`
//! namespace, one per identity per UTC hour:
//!
//! ```rust
//! use vision_mediator::resilience::rate_limiter::{IdentityClass, RateLimiterConfig};
//!
//! let config = RateLimiterConfig::new().with_ceilings(10, 5);
//! assert_eq!(config.ceiling(IdentityClass::Anonymous), 5);
//! ```
//!
//! ## Retry
//!
//! ```rust
//! use vision_mediator::resilience::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::new()
//!     .with_max_attempts(3)
//!     .with_base_delay(Duration::from_secs(1));
//! assert_eq!(config.backoff(3), Duration::from_secs(4));
//! ```

pub mod rate_limiter;
pub mod retry;
