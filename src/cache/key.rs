//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A derived cache key: the hex digest plus the namespace it was derived for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub namespace: String,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            namespace: namespace.into(),
        }
    }
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.hash)
    }
}

/// Deterministic key derivation.
///
/// The input is serialized to JSON (struct fields in declaration order, tuple
/// elements in position order) and hashed with SHA-256 together with the
/// namespace, so free text never shows up in a key.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Mix a deployment-specific salt into every digest.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn make_key<T: Serialize + ?Sized>(&self, namespace: &str, fields: &T) -> CacheKey {
        let payload = serde_json::to_vec(fields).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        if let Some(ref s) = self.salt {
            hasher.update(s.as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(&payload);
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        CacheKey::new(hash, namespace)
    }
}
