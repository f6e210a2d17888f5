//! Correctness Tests for the Partition Cache Subsystem
//!
//! This module validates the observable behavior of each component using
//! small, predictable scenarios. Each test names the partition it expects
//! to be evicted, loaded or kept.
//!
//! ## Test Strategy
//! - Small capacities (2-4 partitions) for predictable eviction
//! - In-memory stores so load counts can be asserted exactly
//! - Manual memory samplers so tiers are reached deterministically

use spellcache::config::{
    MemoryMonitorConfig, MemoryThresholds, PartitionCacheConfig, PreloaderConfig,
    ThresholdUpdate,
};
use spellcache::{
    AdaptiveMemoryManager, CacheError, DictionaryPartition, IntelligentPreloader, Language,
    ManualSampler, MemoryMonitor, MemoryPartitionStore, MemoryTier, PartitionCache, PartitionKey,
};
use std::sync::Arc;

const MIB: u64 = 1024 * 1024;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn en(letter: char) -> PartitionKey {
    PartitionKey::new(Language::English, letter)
}

/// Store holding one English partition per letter in `letters`
fn make_store(letters: &str) -> Arc<MemoryPartitionStore> {
    let store = Arc::new(MemoryPartitionStore::new());
    for letter in letters.chars() {
        store.insert(en(letter), [format!("{letter}word"), format!("{letter}other")]);
    }
    store
}

fn make_cache(capacity: usize, store: Arc<MemoryPartitionStore>) -> Arc<PartitionCache> {
    let config = PartitionCacheConfig {
        capacity,
        ..PartitionCacheConfig::default()
    };
    Arc::new(PartitionCache::new(config, store))
}

fn partition(letter: char) -> DictionaryPartition {
    DictionaryPartition::from_words(en(letter), [format!("{letter}word")])
}

// ============================================================================
// PARTITION CACHE
// ============================================================================

/// Capacity 2; access A, B, C, then A again: A is evicted at C's insert,
/// then B is evicted when A comes back.
#[tokio::test]
async fn test_lru_scenario_capacity_two() {
    let store = make_store("abc");
    let cache = make_cache(2, store.clone());

    cache.get_or_load(en('a')).await;
    cache.get_or_load(en('b')).await;
    cache.get_or_load(en('c')).await;
    assert!(!cache.contains(&en('a')));
    assert_eq!(cache.cached_partitions(), vec![en('c'), en('b')]);

    cache.get_or_load(en('a')).await;
    assert!(!cache.contains(&en('b')));
    assert_eq!(cache.cached_partitions(), vec![en('a'), en('c')]);
    assert_eq!(store.load_count(&en('a')), 2);
}

/// A hit refreshes recency, so the other partition is evicted instead
#[test]
fn test_lru_get_refreshes_recency() {
    let cache = make_cache(2, make_store(""));
    cache.set(partition('a'));
    cache.set(partition('b'));
    assert!(cache.get(&en('a')).is_some());
    cache.set(partition('c'));
    assert!(cache.contains(&en('a')));
    assert!(!cache.contains(&en('b')));
}

/// Resident count never exceeds capacity, whatever the insert order
#[test]
fn test_capacity_invariant() {
    let cache = make_cache(3, make_store(""));
    for (i, letter) in "abcdefghijklmnop".chars().enumerate() {
        cache.set(partition(letter));
        assert!(cache.len() <= 3, "too many partitions after insert {i}");
        if i % 3 == 0 {
            cache.get(&en('a'));
        }
    }
    assert_eq!(cache.len(), 3);
}

/// Replacing a resident partition does not evict anything
#[test]
fn test_set_replaces_in_place() {
    let cache = make_cache(2, make_store(""));
    cache.set(partition('a'));
    cache.set(partition('b'));
    cache.set(DictionaryPartition::from_words(en('a'), ["apple", "avocado"]));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&en('a')).map(|p| p.len()), Some(2));
}

/// Shrinking evicts least recently used partitions immediately
#[test]
fn test_set_max_size_shrinks() {
    let cache = make_cache(4, make_store(""));
    for letter in "abcd".chars() {
        cache.set(partition(letter));
    }
    cache.get(&en('a'));
    assert_eq!(cache.try_set_max_size(2).unwrap(), 2);
    assert_eq!(cache.cached_partitions(), vec![en('a'), en('d')]);

    assert!(matches!(
        cache.try_set_max_size(0),
        Err(CacheError::InvalidCapacity(0))
    ));
    assert_eq!(cache.set_max_size(0), 1);
    assert_eq!(cache.len(), 1);
}

/// Hit rate is hits over requests, and zero before any request
#[test]
fn test_hit_rate_computation() {
    let cache = make_cache(4, make_store(""));
    assert_eq!(cache.stats().hit_rate, 0.0);

    cache.set(partition('a'));
    cache.get(&en('a'));
    cache.get(&en('a'));
    cache.get(&en('b'));
    cache.get(&en('a'));

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.total_hits, 3);
    assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
}

/// Clearing drops partitions but keeps counters
#[test]
fn test_clear_keeps_statistics() {
    let cache = make_cache(4, make_store(""));
    cache.set(partition('a'));
    cache.get(&en('a'));
    assert_eq!(cache.clear(), 1);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().total_hits, 1);
    cache.reset_stats();
    assert_eq!(cache.stats().total_requests, 0);
}

/// Missing partitions are cached as empty markers and never reloaded
#[tokio::test]
async fn test_missing_partition_is_cached_empty() {
    let store = make_store("a");
    let cache = make_cache(4, store.clone());

    for _ in 0..3 {
        assert!(cache.get_or_load(en('z')).await.is_empty());
    }
    assert_eq!(store.load_count(&en('z')), 1);
    assert!(cache.contains(&en('z')));
}

/// Letters that never start a word resolve without I/O or residency
#[tokio::test]
async fn test_excluded_letters_skip_the_store() {
    let store = Arc::new(MemoryPartitionStore::new());
    let cache = make_cache(4, store.clone());
    let hard_sign = PartitionKey::new(Language::Russian, 'ъ');

    assert!(cache.get_or_load(hard_sign).await.is_empty());
    assert_eq!(store.total_loads(), 0);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().total_requests, 0);
}

/// Footprint and word totals only cover resident partitions
#[test]
fn test_introspection_helpers() {
    let cache = make_cache(2, make_store(""));
    cache.set(DictionaryPartition::from_words(en('a'), ["apple", "avocado"]));
    cache.set(DictionaryPartition::from_words(en('b'), ["banana"]));
    assert_eq!(cache.total_words(), 3);
    assert!(cache.memory_usage_bytes() > 0);
    cache.set(partition('c'));
    assert_eq!(cache.total_words(), 2);
}

// ============================================================================
// MEMORY MONITOR
// ============================================================================

fn make_monitor(cache: Arc<PartitionCache>, sampler: Arc<ManualSampler>) -> MemoryMonitor {
    let config = MemoryMonitorConfig {
        thresholds: MemoryThresholds::from_mib(60, 70, 80),
        min_retained: 3,
        critical_retained: 1,
        ..MemoryMonitorConfig::default()
    };
    MemoryMonitor::new(config, cache, sampler)
}

/// Warning { warning: 100, cleanup: 50 } against critical 80 is rejected
#[test]
fn test_threshold_update_rejects_bad_ordering() {
    let cache = make_cache(4, make_store(""));
    let monitor = make_monitor(cache, Arc::new(ManualSampler::new(0)));
    let before = monitor.thresholds();

    let update = ThresholdUpdate {
        warning: Some(100 * MIB),
        cleanup: Some(50 * MIB),
        critical: None,
    };
    assert!(matches!(
        monitor.update_thresholds(update),
        Err(CacheError::InvalidThresholdUpdate { .. })
    ));
    assert_eq!(monitor.thresholds(), before);

    let update = ThresholdUpdate {
        critical: Some(90 * MIB),
        ..ThresholdUpdate::default()
    };
    let applied = monitor.update_thresholds(update).unwrap();
    assert_eq!(applied.critical, 90 * MIB);
    assert!(applied.warning < applied.cleanup && applied.cleanup < applied.critical);
}

/// Reaching critical cuts the cache to the minimum in one check
#[test]
fn test_critical_check_cuts_to_minimum() {
    let cache = make_cache(8, make_store(""));
    for letter in "abcdef".chars() {
        cache.set(partition(letter));
    }
    let sampler = Arc::new(ManualSampler::new(85 * MIB));
    let monitor = make_monitor(cache.clone(), sampler);

    let outcome = monitor.force_check();
    assert_eq!(outcome.tier, MemoryTier::Critical);
    assert_eq!(outcome.evicted, 5);
    assert_eq!(cache.cached_partitions(), vec![en('f')]);
    assert_eq!(cache.max_size(), 8);
}

/// Tier boundaries are inclusive and warnings evict nothing
#[test]
fn test_tiers_follow_thresholds() {
    let cache = make_cache(8, make_store(""));
    for letter in "abcde".chars() {
        cache.set(partition(letter));
    }
    let sampler = Arc::new(ManualSampler::new(0));
    let monitor = make_monitor(cache.clone(), sampler.clone());

    assert_eq!(monitor.force_check().tier, MemoryTier::Normal);
    sampler.set_used(60 * MIB);
    assert_eq!(monitor.force_check().tier, MemoryTier::Warning);
    assert_eq!(cache.len(), 5);

    sampler.set_used(70 * MIB);
    let outcome = monitor.force_check();
    assert_eq!(outcome.tier, MemoryTier::Cleanup);
    // partitions are tiny, so the estimate never drops below cleanup and
    // eviction stops at the retained minimum
    assert_eq!(cache.len(), 3);
    assert_eq!(monitor.stats().cleanup_checks, 1);
}

// ============================================================================
// PRELOADER AND ADAPTIVE MANAGER
// ============================================================================

/// Empty text records no preload attempts
#[tokio::test]
async fn test_empty_text_is_not_preloaded() {
    let cache = make_cache(4, make_store("abc"));
    let preloader = Arc::new(IntelligentPreloader::new(PreloaderConfig::default(), cache));
    assert!(preloader.analyze_and_preload("", Language::English).is_none());
    let stats = preloader.stats();
    assert_eq!(stats.attempts, 0);
    assert_eq!(stats.texts_analyzed, 0);
}

/// Two optimizations with no observations in between agree
#[test]
fn test_optimization_is_idempotent() {
    let store = make_store("abc");
    let cache = make_cache(8, store);
    let sampler = Arc::new(ManualSampler::new(0));
    let monitor = Arc::new(make_monitor(cache.clone(), sampler));
    let preloader = Arc::new(IntelligentPreloader::new(
        PreloaderConfig::default(),
        cache.clone(),
    ));
    let manager = AdaptiveMemoryManager::new(
        Default::default(),
        cache.clone(),
        monitor,
        preloader,
    );

    let words = vec!["apple".to_string(), "banana".to_string()];
    manager.update_usage_data(12, Language::English, &words);
    for _ in 0..25 {
        cache.get(&en('q'));
    }

    let first = manager.force_optimization();
    let second = manager.force_optimization();
    assert_eq!(first.after, second.after);
    assert_eq!(second.before, second.after);
    assert!(!second.applied);
}
