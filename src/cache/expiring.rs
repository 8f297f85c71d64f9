use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{ResponseCache, fingerprint};

/// Adds TTL expiry on top of any [`ResponseCache`].
///
/// Insertion times are tracked per fingerprint. A lookup past the TTL drops
/// the stale value from the inner store and reports a miss.
pub struct ExpiringCache<C> {
    inner: C,
    ttl: Duration,
    created_at: DashMap<String, Instant>,
}

impl<C: ResponseCache> ExpiringCache<C> {
    pub fn new(inner: C, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            created_at: DashMap::new(),
        }
    }

    fn is_expired(&self, created: &Instant) -> bool {
        created.elapsed() >= self.ttl
    }
}

#[async_trait]
impl<C: ResponseCache> ResponseCache for ExpiringCache<C> {
    async fn get(&self, text: &str) -> Option<String> {
        let key = fingerprint(text);
        let expired = self
            .created_at
            .get(&key)
            .is_some_and(|created| self.is_expired(&created));
        if expired {
            tracing::debug!(key = %&key[..8], "cache entry expired");
            self.inner.remove(text).await;
            self.created_at.remove(&key);
            return None;
        }
        self.inner.get(text).await
    }

    async fn set(&self, text: &str, response: &str) {
        self.inner.set(text, response).await;
        self.created_at.insert(fingerprint(text), Instant::now());
    }

    async fn remove(&self, text: &str) {
        self.inner.remove(text).await;
        self.created_at.remove(&fingerprint(text));
    }

    async fn clear(&self) -> usize {
        self.created_at.clear();
        self.inner.clear().await
    }

    // expired entries not yet looked up are still held by the inner store
    async fn entry_count(&self) -> usize {
        let stale = self
            .created_at
            .iter()
            .filter(|created| self.is_expired(created.value()))
            .count();
        self.inner.entry_count().await.saturating_sub(stale)
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}
