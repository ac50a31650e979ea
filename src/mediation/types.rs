use crate::resilience::rate_limiter::IdentityClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is asking. The web layer fills this from the session and the socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub address: String,
}

impl Identity {
    pub fn authenticated(user_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            address: address.into(),
        }
    }

    pub fn anonymous(address: impl Into<String>) -> Self {
        Self {
            user_id: None,
            address: address.into(),
        }
    }

    pub fn class(&self) -> IdentityClass {
        match self.user_id {
            Some(_) => IdentityClass::Authenticated,
            None => IdentityClass::Anonymous,
        }
    }

    /// The value counters are keyed by: user id when logged in, address otherwise.
    pub fn key(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    pub request_id: Uuid,
    /// Time spent inside `obtain` (all provider attempts and backoff on a miss).
    pub latency_seconds: f64,
    /// Provider attempts made for this call; zero on a cache hit.
    pub attempt_count: u32,
    pub cache_hit: bool,
    /// When the text was produced by the provider.
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub prompt_length: usize,
    pub response_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub text: String,
    pub metadata: ResultMetadata,
}

/// What goes into the `ai_responses` namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CachedGuidance {
    pub text: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub prompt_length: usize,
}
