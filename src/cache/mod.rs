//! Response caching.
//!
//! # Responsibilities
//! - Hold upstream responses for a fixed time-to-live
//! - Never serve an entry at or past its expiry
//! - Sweep expired entries periodically
//!
//! # Design Decisions
//! - Only successful responses are stored (no negative caching)
//! - Concurrent misses may both fetch; the later write wins

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// An upstream response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// A thread-safe TTL cache.
#[derive(Debug)]
pub struct ResponseCache<V = CachedResponse> {
    inner: Arc<DashMap<String, CacheEntry<V>>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry. Expired entries are removed and reported as missing.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.inner.get(key) {
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        self.inner.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Purge on a fixed interval until shutdown.
    pub async fn run_purge(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Purged expired cache entries");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: Some("application/json".into()),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let cache = ResponseCache::new();
        cache.set("activeCompetitions", response("[1]"), Duration::from_secs(3600));
        assert_eq!(cache.get("activeCompetitions"), Some(response("[1]")));

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get("activeCompetitions"), Some(response("[1]")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_at_ttl() {
        let cache = ResponseCache::new();
        cache.set("k", response("[]"), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty(), "expired entry removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_and_restarts_ttl() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("k", 1, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", 2, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_invalidate() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("short", 1, Duration::from_secs(1));
        cache.set("long", 2, Duration::from_secs(100));
        cache.set("gone", 3, Duration::from_secs(100));

        assert!(cache.invalidate("gone"));
        assert!(!cache.invalidate("gone"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("k", 1, Duration::from_secs(1));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(cache.clone().run_purge(Duration::from_secs(5), rx));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.is_empty());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
