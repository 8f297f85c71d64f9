//! Content-addressed response cache.
//!
//! Every store implements [`ResponseCache`]: keyed by the fingerprint of the
//! request text, total over its inputs (store failures degrade to a miss).

mod expiring;
mod memory;
mod shared;

pub use expiring::ExpiringCache;
pub use memory::MemoryCache;
pub use shared::RedisCache;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Key/value store mapping request text to a previously generated response.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Cached response for `text`, if any.
    async fn get(&self, text: &str) -> Option<String>;

    /// Store `response` for `text`, replacing any prior value.
    async fn set(&self, text: &str, response: &str);

    /// Drop the entry for `text`, if any.
    async fn remove(&self, text: &str);

    /// Remove every entry and return how many were removed.
    async fn clear(&self) -> usize;

    /// Number of entries currently held.
    async fn entry_count(&self) -> usize;

    /// Short name reported by the health endpoint.
    fn kind(&self) -> &'static str;
}

// Create a cache key (SHA-256 hex digest of the raw text)
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
