//! Response cache shared by all provider adapters.
//!
//! Successful adapter results are stored as serialized JSON under a sha256 key derived from
//! (provider, operation, payload, options). Concurrent misses on the same key may both call
//! the vendor and both write; the writes are identical so the race is harmless.
//! Cache failures are logged and treated as misses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use sha2::{Digest, Sha256};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: String, ttl: Duration);
}

/// A cache backend plus the TTL adapters should store entries with.
#[derive(Clone)]
pub struct CacheHandle {
    store: Arc<dyn ResponseCache>,
    ttl: Duration,
}

impl CacheHandle {
    pub fn new(store: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.store.get(key).await
    }

    pub async fn put(&self, key: &str, value: String) {
        self.store.put(key, value, self.ttl).await
    }
}

/// Builds the cache key for one adapter call.
pub fn cache_key(provider: &str, kind: &str, payload: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [provider, kind, payload, fingerprint] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("ai:{kind}:{:x}", hasher.finalize())
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ────────────────────────────────────────────────────────────────────────────

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict under the write lock, re-checking in case another writer refreshed it.
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(key);
        }
        None
    }

    /// Also sweeps expired entries, so keys that are never read again do not accumulate.
    async fn put(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis backend
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisCache {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> redis::RedisResult<MultiplexedConnection> {
        self.connection
            .get_or_try_init(|| self.client.get_multiplexed_tokio_connection())
            .await
            .cloned()
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis cache unavailable: {e}");
                return None;
            }
        };

        match redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("Redis cache read failed for {key}: {e}");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis cache unavailable: {e}");
                return;
            }
        };

        let result = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await;

        match result {
            Ok(()) => debug!("Cached response under {key}"),
            Err(e) => warn!("Redis cache write failed for {key}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_and_distinguishes_inputs() {
        let a = cache_key("groq", "text", "hello", "{}");
        let b = cache_key("groq", "text", "hello", "{}");
        let c = cache_key("cohere", "text", "hello", "{}");
        let d = cache_key("groq", "text", "hello", r#"{"temperature":0.3}"#);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.starts_with("ai:text:"));
        // "ai:text:" + 64 hex chars
        assert_eq!(a.len(), 8 + 64);
    }

    #[test]
    fn test_cache_key_parts_do_not_run_together() {
        assert_ne!(
            cache_key("ab", "text", "c", ""),
            cache_key("a", "text", "bc", "")
        );
    }

    #[tokio::test]
    async fn test_in_memory_cache_round_trip() {
        let cache = InMemoryCache::new();
        cache
            .put("k", "value".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await.as_deref(), Some("value"));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_in_memory_cache_expires_entries() {
        let cache = InMemoryCache::new();
        cache.put("k", "value".to_string(), Duration::ZERO).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.len().await, 0, "expired entry should be evicted");
    }

    #[tokio::test]
    async fn test_put_sweeps_expired_entries_that_are_never_read() {
        let cache = InMemoryCache::new();
        for i in 0..1000 {
            cache.put(&format!("stale-{i}"), "v".to_string(), Duration::ZERO).await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        cache
            .put("fresh", "v".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("fresh").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_cache_handle_applies_ttl() {
        let store = Arc::new(InMemoryCache::new());
        let handle = CacheHandle::new(store.clone(), Duration::from_secs(3600));

        handle.put("k", "v".to_string()).await;
        assert_eq!(handle.get("k").await.as_deref(), Some("v"));
        assert_eq!(store.len().await, 1);
    }
}
