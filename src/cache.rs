//! Thread-safe partition cache with single-flight loading.
//!
//! [`PartitionCache`] keeps at most `capacity` dictionary partitions
//! resident and evicts the least recently used one when a new partition
//! arrives. It is shared as `Arc<PartitionCache>` between request handlers,
//! the memory monitor, the preloader and the adaptive manager.
//!
//! # Loading
//!
//! [`get_or_load`](PartitionCache::get_or_load) guarantees that concurrent
//! requests for the same missing key trigger a single store load:
//!
//! ```text
//!  caller A ──┐                        ┌──► Arc<DictionaryPartition>
//!  caller B ──┼─► pending[key] (OnceCell) ──► store.load_partition ─► set()
//!  caller C ──┘                        └──► Arc<DictionaryPartition>
//! ```
//!
//! The partition is inserted into the LRU *before* the pending entry is
//! dropped, and the pending registry re-checks residency under its own lock,
//! so a caller arriving in between sees either the in-flight load or the
//! resident partition, never neither.
//!
//! # Failures
//!
//! | Store result                    | Returned                | Cached |
//! |---------------------------------|-------------------------|--------|
//! | words                           | the partition           | yes    |
//! | `NotFound`, `Excluded`, `TooLarge` | empty partition      | yes    |
//! | `Io`, `Timeout`                 | empty partition         | no     |
//!
//! Keys whose letter never starts a word are answered with an empty
//! partition before any lookup or I/O.
//!
//! # Thread Safety
//!
//! The LRU sits behind a `parking_lot::Mutex` that is never held across an
//! `.await`. Lock order is pending registry, then LRU.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::PartitionCacheConfig;
use crate::entry::EntrySnapshot;
use crate::error::{CacheError, StoreError};
use crate::language::PartitionKey;
use crate::lru::PartitionLru;
use crate::metrics::{CacheStatistics, ComponentMetrics};
use crate::partition::DictionaryPartition;
use crate::store::PartitionStore;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Summary returned by [`PartitionCache::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Resident partitions.
    pub size: usize,
    /// Capacity in partitions.
    pub max_size: usize,
    /// Hits divided by requests, 0.0 before the first request.
    pub hit_rate: f64,
    /// Lookups so far.
    pub total_requests: u64,
    /// Lookups that found a resident partition.
    pub total_hits: u64,
}

/// Result of [`PartitionCache::preload`].
#[derive(Debug, Clone)]
pub enum PreloadOutcome {
    /// The partition was already resident; nothing was loaded.
    AlreadyResident,
    /// The key can never hold words; nothing was loaded.
    Excluded,
    /// The partition was loaded and inserted.
    Loaded {
        /// Words in the partition.
        words: usize,
        /// Time spent waiting for the load.
        elapsed: Duration,
    },
    /// The store failed.
    Failed(CacheError),
}

#[derive(Debug, Clone)]
struct Loaded {
    partition: Arc<DictionaryPartition>,
    failure: Option<StoreError>,
    from_store: bool,
}

impl Loaded {
    fn resident(partition: Arc<DictionaryPartition>) -> Self {
        Self {
            partition,
            failure: None,
            from_store: false,
        }
    }
}

type PendingLoad = Arc<OnceCell<Loaded>>;

/// Bounded, LRU-ordered cache of dictionary partitions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use spellcache::{Language, MemoryPartitionStore, PartitionCache, PartitionKey};
/// use spellcache::config::PartitionCacheConfig;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = Arc::new(MemoryPartitionStore::new());
/// store.insert_words(Language::English, ["apple", "avocado"]);
/// let cache = PartitionCache::new(PartitionCacheConfig::default(), store);
///
/// let key = PartitionKey::new(Language::English, 'a');
/// let partition = cache.get_or_load(key).await;
/// assert!(partition.contains("apple"));
/// assert_eq!(cache.stats().size, 1);
/// # });
/// ```
pub struct PartitionCache {
    config: PartitionCacheConfig,
    store: Arc<dyn PartitionStore>,
    lru: Mutex<PartitionLru>,
    pending: Mutex<HashMap<PartitionKey, PendingLoad>>,
}

impl PartitionCache {
    /// Creates an empty cache. A zero capacity is raised to one.
    pub fn new(config: PartitionCacheConfig, store: Arc<dyn PartitionStore>) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        PartitionCache {
            config,
            store,
            lru: Mutex::new(PartitionLru::new(capacity)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the resident partition for `key`, promoting it to most
    /// recently used. Records a hit or a miss.
    pub fn get(&self, key: &PartitionKey) -> Option<Arc<DictionaryPartition>> {
        self.lru.lock().get(key)
    }

    /// Inserts or replaces a partition, evicting the least recently used one
    /// if the cache is full.
    pub fn set(&self, partition: impl Into<Arc<DictionaryPartition>>) {
        let partition = partition.into();
        let key = partition.key();
        let evicted = self.lru.lock().insert(partition);
        for old in &evicted {
            debug!(partition = %old.key(), inserted = %key, "evicted least recently used partition");
        }
    }

    /// Returns `true` if `key` is resident. Does not touch statistics.
    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.lru.lock().contains(key)
    }

    /// Drops `key` if resident. Returns whether anything was removed.
    pub fn remove(&self, key: &PartitionKey) -> bool {
        let removed = self.lru.lock().remove(key).is_some();
        if removed {
            debug!(partition = %key, "removed partition");
        }
        removed
    }

    /// Evicts and returns the least recently used partition.
    pub fn evict_lru(&self) -> Option<Arc<DictionaryPartition>> {
        let evicted = self.lru.lock().pop_lru();
        if let Some(partition) = &evicted {
            debug!(partition = %partition.key(), "evicted partition on request");
        }
        evicted
    }

    /// Key that [`evict_lru`](Self::evict_lru) would remove next.
    pub fn lru_key(&self) -> Option<PartitionKey> {
        self.lru.lock().lru_key()
    }

    /// Changes capacity, evicting least recently used partitions until the
    /// resident count fits. Fails for zero.
    pub fn try_set_max_size(&self, max_size: usize) -> Result<usize, CacheError> {
        let capacity = NonZeroUsize::new(max_size).ok_or(CacheError::InvalidCapacity(max_size))?;
        let (previous, evicted) = {
            let mut lru = self.lru.lock();
            let previous = lru.cap().get();
            (previous, lru.set_capacity(capacity))
        };
        if previous != max_size {
            info!(
                from = previous,
                to = max_size,
                evicted = evicted.len(),
                "cache capacity changed"
            );
        }
        Ok(evicted.len())
    }

    /// Like [`try_set_max_size`](Self::try_set_max_size) but raises zero to
    /// one. Returns the capacity actually applied.
    pub fn set_max_size(&self, max_size: usize) -> usize {
        let clamped = max_size.max(1);
        if clamped != max_size {
            warn!(requested = max_size, applied = clamped, "capacity clamped");
        }
        // clamped is never zero
        let _ = self.try_set_max_size(clamped);
        clamped
    }

    /// Capacity in partitions.
    pub fn max_size(&self) -> usize {
        self.lru.lock().cap().get()
    }

    /// Resident partitions.
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Returns `true` if nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Drops every resident partition. Statistics are kept.
    pub fn clear(&self) -> usize {
        let removed = self.lru.lock().clear();
        info!(removed, "cache cleared");
        removed
    }

    /// Zeroes every counter.
    pub fn reset_stats(&self) {
        *self.lru.lock().stats_mut() = CacheStatistics::default();
    }

    /// Size, capacity and hit statistics.
    pub fn stats(&self) -> CacheStats {
        let lru = self.lru.lock();
        let stats = lru.stats();
        CacheStats {
            size: lru.len(),
            max_size: lru.cap().get(),
            hit_rate: stats.hit_rate(),
            total_requests: stats.requests,
            total_hits: stats.hits,
        }
    }

    /// Copy of the full counters, including per-key request counts.
    pub fn statistics(&self) -> CacheStatistics {
        self.lru.lock().stats().clone()
    }

    /// Words across resident partitions.
    pub fn total_words(&self) -> usize {
        self.lru.lock().fold_partitions(0, |sum, p| sum + p.len())
    }

    /// Estimated footprint of resident partitions in bytes.
    pub fn memory_usage_bytes(&self) -> u64 {
        self.lru
            .lock()
            .fold_partitions(0, |sum, p| sum + p.footprint_bytes())
    }

    /// Estimated footprint of resident partitions in MiB.
    pub fn memory_usage_mb(&self) -> f64 {
        self.memory_usage_bytes() as f64 / BYTES_PER_MIB
    }

    /// Resident keys, most recently used first.
    pub fn cached_partitions(&self) -> Vec<PartitionKey> {
        self.lru.lock().keys_by_recency()
    }

    /// Per-entry snapshots, most recently used first.
    pub fn entry_snapshots(&self) -> Vec<EntrySnapshot> {
        self.lru.lock().snapshots()
    }

    /// Loads currently in flight.
    pub fn pending_loads(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the partition for `key`, loading it from the store on a miss.
    ///
    /// Never fails: store errors produce an empty partition, see the module
    /// docs for which ones are cached.
    pub async fn get_or_load(&self, key: PartitionKey) -> Arc<DictionaryPartition> {
        if key.is_excluded() {
            return Arc::new(DictionaryPartition::empty(key));
        }
        if let Some(partition) = self.get(&key) {
            return partition;
        }
        let loaded = self.load_shared(key).await;
        if let Some(err) = &loaded.failure {
            debug!(error = %CacheError::PartitionUnavailable { key, source: err.clone() }, "serving empty partition");
        }
        loaded.partition
    }

    /// Loads `key` into the cache without recording a lookup.
    ///
    /// Shares in-flight loads with [`get_or_load`](Self::get_or_load).
    pub async fn preload(&self, key: PartitionKey) -> PreloadOutcome {
        if key.is_excluded() {
            return PreloadOutcome::Excluded;
        }
        if self.contains(&key) {
            return PreloadOutcome::AlreadyResident;
        }
        let started = Instant::now();
        let loaded = self.load_shared(key).await;
        match loaded.failure {
            Some(StoreError::Excluded(_)) => PreloadOutcome::Excluded,
            Some(source) => PreloadOutcome::Failed(CacheError::PreloadFailure { key, source }),
            None if !loaded.from_store => PreloadOutcome::AlreadyResident,
            None => PreloadOutcome::Loaded {
                words: loaded.partition.len(),
                elapsed: started.elapsed(),
            },
        }
    }

    async fn load_shared(&self, key: PartitionKey) -> Loaded {
        let cell = {
            let mut pending = self.pending.lock();
            // Re-check under the registry lock: a load that finished after our
            // miss has already inserted its partition.
            if let Some(partition) = self.lru.lock().peek(&key) {
                return Loaded::resident(partition);
            }
            Arc::clone(pending.entry(key).or_default())
        };

        let loaded = cell.get_or_init(|| self.fetch(key)).await.clone();

        let mut pending = self.pending.lock();
        if pending.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            pending.remove(&key);
        }
        loaded
    }

    async fn fetch(&self, key: PartitionKey) -> Loaded {
        let timeout = self.config.load_timeout();
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.store.load_partition(&key)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(key, timeout)),
        };

        match result {
            Ok(words) => {
                let partition = Arc::new(DictionaryPartition::new(key, words));
                self.lru.lock().stats_mut().record_load(true);
                self.set(Arc::clone(&partition));
                debug!(
                    partition = %key,
                    words = partition.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "loaded partition"
                );
                Loaded {
                    partition,
                    failure: None,
                    from_store: true,
                }
            }
            Err(err) if err.is_permanent() => {
                let partition = Arc::new(DictionaryPartition::empty(key));
                self.lru.lock().stats_mut().record_load(false);
                self.set(Arc::clone(&partition));
                debug!(partition = %key, error = %err, "caching empty partition");
                Loaded {
                    partition,
                    failure: Some(err),
                    from_store: true,
                }
            }
            Err(err) => {
                self.lru.lock().stats_mut().record_load(false);
                warn!(partition = %key, error = %err, "partition load failed, will retry on next lookup");
                Loaded {
                    partition: Arc::new(DictionaryPartition::empty(key)),
                    failure: Some(err),
                    from_store: true,
                }
            }
        }
    }
}

impl fmt::Debug for PartitionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Loads lock pending before the LRU; never hold both here.
        let pending = self.pending.lock().len();
        f.debug_struct("PartitionCache")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("lru", &*self.lru.lock())
            .field("pending", &pending)
            .finish()
    }
}

impl ComponentMetrics for PartitionCache {
    fn metrics(&self) -> std::collections::BTreeMap<String, f64> {
        let lru = self.lru.lock();
        let mut metrics = lru.stats().to_btreemap();
        metrics.insert("size".to_string(), lru.len() as f64);
        metrics.insert("max_size".to_string(), lru.cap().get() as f64);
        let (words, bytes) = lru.fold_partitions((0usize, 0u64), |(w, b), p| {
            (w + p.len(), b + p.footprint_bytes())
        });
        metrics.insert("total_words".to_string(), words as f64);
        metrics.insert("memory_usage_bytes".to_string(), bytes as f64);
        metrics
    }

    fn component_name(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::store::MemoryPartitionStore;

    fn key(letter: char) -> PartitionKey {
        PartitionKey::new(Language::Russian, letter)
    }

    fn make_cache(capacity: usize) -> (Arc<MemoryPartitionStore>, PartitionCache) {
        let store = Arc::new(MemoryPartitionStore::new());
        store.insert_words(
            Language::Russian,
            ["абзац", "абажур", "автобус", "банк", "вода", "город", "дом"],
        );
        let config = PartitionCacheConfig {
            capacity,
            ..PartitionCacheConfig::default()
        };
        let cache = PartitionCache::new(config, store.clone());
        (store, cache)
    }

    fn make_partition(letter: char) -> DictionaryPartition {
        DictionaryPartition::from_words(key(letter), [format!("{letter}x")])
    }

    #[test]
    fn test_scenario_lru_order() {
        let (_, cache) = make_cache(3);
        cache.set(make_partition('а'));
        cache.set(make_partition('б'));
        cache.set(make_partition('в'));
        assert!(cache.get(&key('а')).is_some());
        cache.set(make_partition('г'));

        assert!(!cache.contains(&key('б')));
        assert_eq!(cache.cached_partitions(), vec![key('г'), key('а'), key('в')]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_stats_before_any_request() {
        let (_, cache) = make_cache(8);
        let stats = cache.stats();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.max_size, 8);
    }

    #[test]
    fn test_set_max_size_evicts() {
        let (_, cache) = make_cache(4);
        for letter in ['а', 'б', 'в', 'г'] {
            cache.set(make_partition(letter));
        }
        assert_eq!(cache.try_set_max_size(2).unwrap(), 2);
        assert_eq!(cache.cached_partitions(), vec![key('г'), key('в')]);
        assert!(matches!(
            cache.try_set_max_size(0),
            Err(CacheError::InvalidCapacity(0))
        ));
        assert_eq!(cache.set_max_size(0), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_keeps_stats_until_reset() {
        let (_, cache) = make_cache(2);
        cache.set(make_partition('а'));
        cache.get(&key('а'));
        cache.get(&key('б'));
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().total_requests, 2);
        cache.reset_stats();
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_get_or_load_caches_partition() {
        let (store, cache) = make_cache(4);
        let a = cache.get_or_load(key('а')).await;
        assert_eq!(a.len(), 3);
        let again = cache.get_or_load(key('а')).await;
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(store.load_count(&key('а')), 1);
        assert_eq!(cache.stats().total_hits, 1);
        assert_eq!(cache.total_words(), 3);
        assert!(cache.memory_usage_bytes() > 0);
    }

    #[tokio::test]
    async fn test_missing_partition_is_cached_empty() {
        let (store, cache) = make_cache(4);
        let missing = cache.get_or_load(key('я')).await;
        assert!(missing.is_empty());
        assert!(cache.contains(&key('я')));
        cache.get_or_load(key('я')).await;
        assert_eq!(store.load_count(&key('я')), 1);
        assert_eq!(cache.statistics().load_failures, 1);
    }

    #[tokio::test]
    async fn test_excluded_key_skips_store() {
        let (store, cache) = make_cache(4);
        let partition = cache.get_or_load(key('ъ')).await;
        assert!(partition.is_empty());
        assert_eq!(store.load_count(&key('ъ')), 0);
        assert!(cache.is_empty());
        assert!(matches!(
            cache.preload(key('ь')).await,
            PreloadOutcome::Excluded
        ));
    }

    #[tokio::test]
    async fn test_preload_does_not_count_requests() {
        let (_, cache) = make_cache(4);
        assert!(matches!(
            cache.preload(key('б')).await,
            PreloadOutcome::Loaded { words: 1, .. }
        ));
        assert!(matches!(
            cache.preload(key('б')).await,
            PreloadOutcome::AlreadyResident
        ));
        assert!(matches!(
            cache.preload(key('ж')).await,
            PreloadOutcome::Failed(CacheError::PreloadFailure { .. })
        ));
        assert_eq!(cache.stats().total_requests, 0);
        assert_eq!(cache.pending_loads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_cached() {
        let store = Arc::new(MemoryPartitionStore::new().with_latency(Duration::from_secs(10)));
        store.insert_words(Language::Russian, ["абзац"]);
        let config = PartitionCacheConfig {
            capacity: 2,
            load_timeout_ms: 100,
        };
        let cache = PartitionCache::new(config, store.clone());
        let partition = cache.get_or_load(key('а')).await;
        assert!(partition.is_empty());
        assert!(!cache.contains(&key('а')));
        cache.get_or_load(key('а')).await;
        assert_eq!(store.load_count(&key('а')), 2);
    }

    #[test]
    fn test_metrics_snapshot() {
        let (_, cache) = make_cache(2);
        cache.set(make_partition('а'));
        let metrics = cache.metrics();
        assert_eq!(metrics.get("size"), Some(&1.0));
        assert_eq!(metrics.get("max_size"), Some(&2.0));
        assert_eq!(metrics.get("total_words"), Some(&1.0));
        assert_eq!(cache.component_name(), "cache");
    }
}
