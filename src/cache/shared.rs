use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{ResponseCache, fingerprint};

const KEY_PREFIX: &str = "textgen:cache:";

/// Cache backed by a shared redis instance.
///
/// Store errors are logged and treated as a miss (or a no-op for writes), so
/// an unreachable redis never fails a request.
pub struct RedisCache {
    conn: ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisCache {
    pub async fn connect(url: &str, ttl: Option<Duration>) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url, "connected to redis cache");
        Ok(Self { conn, ttl })
    }

    fn key(text: &str) -> String {
        format!("{KEY_PREFIX}{}", fingerprint(text))
    }

    async fn keys(&self) -> redis::RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut iter: redis::AsyncIter<String> =
            conn.scan_match(format!("{KEY_PREFIX}*")).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, text: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(Self::key(text)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "redis get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, text: &str, response: &str) {
        let mut conn = self.conn.clone();
        let key = Self::key(text);
        let result = match self.ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, response, ttl.as_secs()).await,
            None => conn.set::<_, _, ()>(key, response).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "redis set failed, response not cached");
        }
    }

    async fn remove(&self, text: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(Self::key(text)).await {
            tracing::warn!(error = %e, "redis delete failed");
        }
    }

    async fn clear(&self) -> usize {
        let keys = match self.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "redis scan failed, cache not cleared");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        let mut conn = self.conn.clone();
        match conn.del::<_, usize>(keys).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "redis delete failed");
                0
            }
        }
    }

    async fn entry_count(&self) -> usize {
        self.keys().await.map(|keys| keys.len()).unwrap_or(0)
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}
