//! In-memory TTL cache for expensive reads

use crate::scheduler::SweepHandle;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Statistics about cache performance
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Key/value cache with per-entry expiry.
///
/// Expired entries are dropped lazily by [`TtlCache::get`] and proactively by
/// a periodic sweep owned by the cache.
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache that sweeps expired entries every `sweep_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, CacheEntry<V>>> = Arc::new(DashMap::new());
        let swept = entries.clone();

        let sweeper = SweepHandle::spawn("ttl_cache", sweep_interval, move || {
            let removed = remove_expired(&swept, Instant::now());
            if removed > 0 {
                debug!("Swept {} expired cache entries", removed);
            }
        });

        info!("Initializing TTL cache with sweep_interval={:?}", sweep_interval);

        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Create a cache with no background sweep
    pub fn unscheduled() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    /// Fresh value for `key`, evicting it if it has expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for key: {}", key);
                return Some(entry.value.clone());
            }
        }

        // Re-check under the write lock so a concurrent set is not thrown away
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            debug!("Evicted expired key: {}", key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for key: {}", key);
        None
    }

    /// Store `value` under `key`, replacing whatever was there
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        debug!("Cached value for key: {} (ttl {:?})", key, ttl);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
        info!("Cache cleared");
    }

    /// Remove every expired entry; returns how many went
    pub fn cleanup(&self) -> usize {
        remove_expired(&self.entries, Instant::now())
    }

    /// Whether an entry is physically held, fresh or not
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached value, or run `fetcher` and cache its result.
    ///
    /// Concurrent misses on the same key each run their own fetcher; there is
    /// no request coalescing. Fetcher errors are returned and not cached.
    pub async fn get_cached_data<F, Fut, E>(&self, key: &str, fetcher: F, ttl: Duration) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = fetcher().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            size: self.entries.len(),
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }

    /// Whether the background sweep is active
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|guard| guard.as_ref().is_some_and(SweepHandle::is_running))
            .unwrap_or(false)
    }

    /// Stop the background sweep. The cache stays usable.
    pub fn dispose(&self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(mut handle) = guard.take() {
                handle.cancel();
            }
        }
    }
}

fn remove_expired<V>(entries: &DashMap<String, CacheEntry<V>>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_set_get() {
        let cache = TtlCache::unscheduled();
        cache.set("recipes", vec![1, 2, 3], MINUTE);

        assert_eq!(cache.get("recipes"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = TtlCache::unscheduled();
        cache.set("k", "old".to_string(), MINUTE);
        cache.set("k", "new".to_string(), MINUTE);

        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_get_evicts() {
        let cache = TtlCache::unscheduled();
        cache.set("k", 1u32, Duration::from_millis(50));
        assert!(cache.contains_key("k"));

        tokio::time::sleep(Duration::from_millis(80)).await;

        // still physically present until someone looks
        assert!(cache.contains_key("k"));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.contains_key("k"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let cache = TtlCache::unscheduled();
        cache.set("short", 1u32, Duration::from_millis(20));
        cache.set("long", 2u32, MINUTE);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.cleanup(), 1);
        assert!(!cache.contains_key("short"));
        assert_eq!(cache.get("long"), Some(2));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = TtlCache::unscheduled();
        cache.set("a", 1u32, MINUTE);
        cache.set("b", 2u32, MINUTE);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_background_sweep_and_dispose() {
        let cache = TtlCache::new(Duration::from_millis(30));
        assert!(cache.is_sweeping());

        cache.set("k", 1u32, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cache.contains_key("k"));

        cache.dispose();
        assert!(!cache.is_sweeping());

        cache.set("k", 1u32, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.contains_key("k"));
    }

    #[tokio::test]
    async fn test_get_cached_data_fetches_once_when_fresh() {
        let cache = TtlCache::unscheduled();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u32, ()> = cache
                .get_cached_data("total", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }, MINUTE)
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[tokio::test]
    async fn test_get_cached_data_errors_not_cached() {
        let cache: TtlCache<u32> = TtlCache::unscheduled();

        let failed: Result<u32, &str> = cache
            .get_cached_data("k", || async { Err("disk unavailable") }, MINUTE)
            .await;
        assert_eq!(failed, Err("disk unavailable"));
        assert!(!cache.contains_key("k"));
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_fetch() {
        let cache = Arc::new(TtlCache::unscheduled());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();

        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_cached_data("slow", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ()>(1u32)
                    }, MINUTE)
                    .await
            }));
        }

        for task in futures::future::join_all(tasks).await {
            assert_eq!(task.unwrap(), Ok(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = TtlCache::unscheduled();
        cache.set("k", 1u32, MINUTE);
        cache.get("k");
        cache.get("nope");

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_usable_outside_runtime() {
        let cache = TtlCache::unscheduled();
        let value: Result<u32, ()> =
            tokio_test::block_on(cache.get_cached_data("k", || async { Ok(5) }, MINUTE));
        assert_eq!(value, Ok(5));
        assert_eq!(cache.get("k"), Some(5));
    }
}
