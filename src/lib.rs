//! # vision-mediator
//!
//! 职业指导应用的请求中介层：缓存、按身份限流、带退避重试的 AI 调用。
//!
//! Request-mediation layer between a career-guidance web application and an
//! external generative-AI provider.
//!
//! ## Overview
//!
//! The web layer authenticates users, validates the submitted profile and
//! renders results. Everything in between lives here:
//!
//! - **Caching**: responses keyed by a SHA-256 digest of profile and goal,
//!   stored in process memory or Redis via the [`cache`] module
//! - **Rate limiting**: fixed hourly ceilings per authenticated user or
//!   anonymous address via [`resilience::rate_limiter`]
//! - **Retries**: bounded exponential backoff around the provider call via
//!   [`resilience::retry`]
//! - **Mediation**: [`Mediator::obtain`] composes the three
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vision_mediator::{Identity, MediatorBuilder, MediatorConfig, Profile};
//!
//! #[tokio::main]
//! async fn main() -> vision_mediator::Result<()> {
//!     let mediator = MediatorBuilder::new()
//!         .config(MediatorConfig::from_env()?)
//!         .build()
//!         .await?;
//!
//!     let profile = Profile::new("Ana", 20, "BSc", "data", "chess");
//!     let who = Identity::authenticated("42", "203.0.113.7");
//!     let result = mediator.obtain(&who, &profile, "become a data analyst").await?;
//!     println!("{}", result.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Key derivation, memory and Redis backends, cache manager |
//! | [`resilience`] | Rate limiter and retrying invoker |
//! | [`provider`] | Provider trait, error classes, Gemini implementation |
//! | [`mediation`] | The mediator, its builder and result types |
//! | [`prompt`] | Student profile and prompt rendering |
//! | [`config`] | Configuration from YAML and environment |
//! | [`clock`] | Wall-clock abstraction for window keys |

pub mod cache;
pub mod clock;
pub mod config;
pub mod mediation;
pub mod prompt;
pub mod provider;
pub mod resilience;

pub use cache::{CacheStats, CacheKeyGenerator};
pub use config::MediatorConfig;
pub use mediation::{Identity, InvocationResult, Mediator, MediatorBuilder, ResultMetadata, UsageStats};
pub use prompt::Profile;
pub use provider::{Provider, ProviderError};
pub use resilience::rate_limiter::{IdentityClass, RateLimitDecision};
pub use resilience::retry::{InvocationError, InvocationErrorKind};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
