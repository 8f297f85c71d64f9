use async_trait::async_trait;
use dashmap::DashMap;

use super::{ResponseCache, fingerprint};

// In-process cache: fingerprint -> response
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, text: &str) -> Option<String> {
        self.entries
            .get(&fingerprint(text))
            .map(|entry| entry.value().clone())
    }

    async fn set(&self, text: &str, response: &str) {
        self.entries.insert(fingerprint(text), response.to_string());
    }

    async fn remove(&self, text: &str) {
        self.entries.remove(&fingerprint(text));
    }

    async fn clear(&self) -> usize {
        // count while removing so a concurrent insert is either counted or kept
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    async fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_response() {
        let cache = MemoryCache::new();
        let long = "x".repeat(10_000);
        for text in ["Hello", "", "héllo wörld", "日本語のテキスト", long.as_str()] {
            cache.set(text, "reply").await;
            assert_eq!(cache.get(text).await.as_deref(), Some("reply"));
        }
    }

    #[tokio::test]
    async fn one_character_difference_misses() {
        let cache = MemoryCache::new();
        cache.set("Hello", "world").await;
        assert_eq!(cache.get("Hello!").await, None);
        assert_eq!(cache.get("hello").await, None);
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let cache = MemoryCache::new();
        cache.set("a", "first").await;
        cache.set("a", "second").await;
        assert_eq!(cache.get("a").await.as_deref(), Some("second"));
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn remove_drops_only_that_entry() {
        let cache = MemoryCache::new();
        cache.set("a", "1").await;
        cache.set("b", "2").await;
        cache.remove("a").await;
        cache.remove("missing").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await.as_deref(), Some("2"));
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let cache = MemoryCache::new();
        cache.set("a", "1").await;
        cache.set("b", "2").await;
        cache.set("c", "3").await;

        assert_eq!(cache.clear().await, 3);
        for text in ["a", "b", "c"] {
            assert_eq!(cache.get(text).await, None);
        }
        assert_eq!(cache.clear().await, 0);
    }

    #[tokio::test]
    async fn concurrent_sets_all_land() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let mut tasks = Vec::new();
        for i in 0..64 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache.set(&format!("prompt-{i}"), &format!("reply-{i}")).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.entry_count().await, 64);
        assert_eq!(cache.get("prompt-17").await.as_deref(), Some("reply-17"));
    }
}
