//! Answer cache store with TTL expiry

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    types::{AnswerPayload, CacheKey, CacheStats},
};
use crate::clock::{SharedClock, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// TTL-bounded mapping from question text to a computed answer
///
/// This implementation provides:
/// - A single mutex around the map, held only for the lookup or mutation
/// - Lazy eviction of expired entries on read
/// - A full purge pass for expired entries
/// - A clear generation, so callers can refuse to insert answers that
///   were computed before the most recent clear
pub struct AnswerCache {
    /// Cache configuration
    config: CacheConfig,

    /// Time source
    clock: SharedClock,

    /// Internal storage
    store: Mutex<CacheStore>,
}

/// Internal cache storage
struct CacheStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// Bumped by every clear
    generation: u64,

    /// Current cache statistics
    stats: CacheStats,
}

impl AnswerCache {
    /// Create a new cache on the system clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a new cache on the given clock
    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Self {
        info!("Initializing answer cache with config: {:?}", config);

        Self {
            config,
            clock,
            store: Mutex::new(CacheStore {
                entries: HashMap::new(),
                generation: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a payload if present and younger than the TTL
    ///
    /// An expired entry is removed as a side effect.
    pub async fn get(&self, key: &str) -> Option<AnswerPayload> {
        let now = self.clock.now();
        let ttl = self.config.chrono_ttl();
        let mut store = self.store.lock().await;

        let expired = match store.entries.get(key) {
            Some(entry) if !entry.is_expired(now, ttl) => {
                let payload = entry.payload.clone();
                store.stats.hits += 1;
                debug!("Cache hit: {}", key);
                return Some(payload);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("Cache entry expired: {}", key);
            store.entries.remove(key);
            store.stats.expirations += 1;
            store.stats.entries = store.entries.len();
        } else {
            debug!("Cache miss: {}", key);
        }
        store.stats.misses += 1;

        None
    }

    /// Insert or overwrite an entry, stamped with the current time
    pub async fn put(&self, key: CacheKey, payload: AnswerPayload) {
        let stored_at = self.clock.now();
        let mut store = self.store.lock().await;
        store.insert(CacheEntry::new(key, payload, stored_at));
    }

    /// Insert only if no clear happened since `generation` was read
    ///
    /// Returns whether the entry was stored. The generation check and the
    /// insert happen under the same lock that `clear` takes.
    pub async fn put_if_generation(
        &self,
        key: CacheKey,
        payload: AnswerPayload,
        generation: u64,
    ) -> bool {
        let stored_at = self.clock.now();
        let mut store = self.store.lock().await;

        if store.generation != generation {
            debug!(
                "Refusing cache insert for {}: generation {} is behind {}",
                key, generation, store.generation
            );
            store.stats.stale_puts += 1;
            return false;
        }

        store.insert(CacheEntry::new(key, payload, stored_at));
        true
    }

    /// Current clear generation
    pub async fn generation(&self) -> u64 {
        self.store.lock().await.generation
    }

    /// Remove all entries
    pub async fn clear(&self) {
        let mut store = self.store.lock().await;

        let count = store.entries.len();
        store.entries.clear();
        store.generation += 1;
        store.stats.clears += 1;
        store.stats.entries = 0;

        info!("Cleared {} entries from answer cache", count);
    }

    /// Remove exactly the entries whose age has reached the TTL
    ///
    /// Returns the number of removed entries.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.chrono_ttl();
        let mut store = self.store.lock().await;

        let before = store.entries.len();
        store.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let removed = before - store.entries.len();

        if removed > 0 {
            store.stats.expirations += removed as u64;
            store.stats.entries = store.entries.len();
            debug!("Purged {} expired entries", removed);
        }

        removed
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats.clone()
    }

    /// Number of stored entries, including ones not yet lazily evicted
    pub async fn len(&self) -> usize {
        self.store.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.entries.is_empty()
    }
}

impl CacheStore {
    fn insert(&mut self, entry: CacheEntry) {
        if self.entries.contains_key(&entry.key) {
            debug!("Updating existing cache entry: {}", entry.key);
        } else {
            debug!("Inserting new cache entry: {}", entry.key);
        }
        self.entries.insert(entry.key.clone(), entry);
        self.stats.entries = self.entries.len();
    }
}

/// Background task for periodic cache purging
pub async fn start_auto_purge(cache: Arc<AnswerCache>) {
    let interval = cache.config.purge_interval;

    info!("Starting periodic cache purge task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let removed = cache.purge_expired().await;
        if removed > 0 {
            debug!("Periodic purge removed {} entries, {}", removed, cache.stats().await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn payload(answer: &str) -> AnswerPayload {
        AnswerPayload {
            answer: answer.to_string(),
            score: 0.9,
            start: 0,
            end: answer.chars().count(),
            snippet: answer.to_string(),
            response_time: 0.01,
        }
    }

    fn cache_with_clock(ttl: Duration) -> (AnswerCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig::builder().ttl(ttl).build();
        (AnswerCache::with_clock(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_basic_put_and_get() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));

        cache.put("key1".to_string(), payload("value1")).await;

        let value = cache.get("key1").await;
        assert_eq!(value, Some(payload("value1")));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = AnswerCache::new(CacheConfig::default());

        assert_eq!(cache.get("nonexistent").await, None);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiration_evicts_on_read() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(10));

        cache.put("key1".to_string(), payload("value1")).await;

        clock.advance(Duration::from_millis(9_999));
        assert!(cache.get("key1").await.is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get("key1").await.is_none());
        assert_eq!(cache.len().await, 0);

        let stats = cache.stats().await;
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_restamps() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(10));

        cache.put("key1".to_string(), payload("old")).await;
        clock.advance(Duration::from_secs(8));
        cache.put("key1".to_string(), payload("new")).await;
        clock.advance(Duration::from_secs(8));

        assert_eq!(cache.get("key1").await, Some(payload("new")));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_are_not_normalized() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));

        cache.put("What is it?".to_string(), payload("a")).await;

        assert!(cache.get("what is it?").await.is_none());
        assert!(cache.get(" What is it?").await.is_none());
        assert!(cache.get("What is it?").await.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));

        cache.put("key1".to_string(), payload("value1")).await;
        cache.put("key2".to_string(), payload("value2")).await;

        cache.clear().await;

        assert!(cache.is_empty().await);
        assert!(cache.get("key1").await.is_none());
        assert!(cache.get("key2").await.is_none());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(10));

        cache.put("old".to_string(), payload("old")).await;
        clock.advance(Duration::from_secs(6));
        cache.put("young".to_string(), payload("young")).await;
        clock.advance(Duration::from_secs(4));

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.purge_expired().await, 0);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("young").await.is_some());
    }

    #[tokio::test]
    async fn test_put_if_generation_refuses_after_clear() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));

        let generation = cache.generation().await;
        cache.clear().await;

        let stored = cache
            .put_if_generation("key1".to_string(), payload("stale"), generation)
            .await;
        assert!(!stored);
        assert!(cache.get("key1").await.is_none());

        let current = cache.generation().await;
        assert!(cache
            .put_if_generation("key1".to_string(), payload("fresh"), current)
            .await);
        assert_eq!(cache.get("key1").await, Some(payload("fresh")));
        assert_eq!(cache.stats().await.stale_puts, 1);
    }
}
