//! Content-addressed cache for LLM responses, keyed by a SHA-256
//! fingerprint of the request. Failures here are degradation, never a
//! hard error: a cache miss or a broken backend just means the fallback
//! runner talks to the providers again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl_secs: u64);
}

/// Always misses, never stores. Used when `cache.backend = "none"`.
pub struct NoopCacheBackend;

#[async_trait]
impl CacheBackend for NoopCacheBackend {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: String, _ttl_secs: u64) {}
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process cache standing in for a network-shared backend (e.g.
/// Redis). A single-process deployment needs no network hop; a
/// multi-process deployment would swap this for a networked
/// [`CacheBackend`] impl without touching the fallback runner.
#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, Entry>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if let Some(expires_at) = entry.expires_at
            && Instant::now() >= expires_at
        {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) {
        let expires_at =
            if ttl_secs == 0 { None } else { Some(Instant::now() + Duration::from_secs(ttl_secs)) };
        self.entries.insert(key.to_string(), Entry { value, expires_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let cache = InMemoryCacheBackend::new();
        cache.set("k", "v".to_string(), 60).await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = InMemoryCacheBackend::new();
        cache.entries.insert(
            "k".to_string(),
            Entry { value: "v".to_string(), expires_at: Some(Instant::now() - Duration::from_secs(1)) },
        );
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn noop_backend_always_misses() {
        let cache = NoopCacheBackend;
        cache.set("k", "v".to_string(), 60).await;
        assert_eq!(cache.get("k").await, None);
    }
}
