//! Metrics System
//!
//! Every long-lived component reports its counters through the
//! [`ComponentMetrics`] trait as a `BTreeMap<String, f64>`, so a service can
//! merge them into one flat, deterministically ordered snapshot for logs or
//! an export endpoint.
//!
//! # Why BTreeMap over HashMap?
//!
//! - **Deterministic ordering**: the same counters print in the same order
//!   every time, which keeps logs and test assertions stable.
//! - **Stable serialization**: JSON exports have predictable key ordering.
//!
//! [`CacheStatistics`] holds the raw counters of the partition cache.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::language::PartitionKey;

/// Raw counters maintained by the partition cache.
///
/// Counters only grow; they are zeroed by an explicit
/// [`PartitionCache::reset_stats`](crate::PartitionCache::reset_stats) and
/// survive [`PartitionCache::clear`](crate::PartitionCache::clear).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CacheStatistics {
    /// Lookups made through `get`.
    pub requests: u64,
    /// Lookups that found a resident partition.
    pub hits: u64,
    /// Partitions inserted or replaced.
    pub insertions: u64,
    /// Partitions evicted by capacity, pressure or explicit removal.
    pub evictions: u64,
    /// Successful loads from the store.
    pub loads: u64,
    /// Loads that failed, permanently or not.
    pub load_failures: u64,
    /// Lookups per partition, hits and misses alike.
    pub per_key_requests: BTreeMap<PartitionKey, u64>,
}

impl CacheStatistics {
    /// Records a lookup that found `key` resident.
    pub fn record_hit(&mut self, key: PartitionKey) {
        self.requests += 1;
        self.hits += 1;
        *self.per_key_requests.entry(key).or_default() += 1;
    }

    /// Records a lookup that did not find `key`.
    pub fn record_miss(&mut self, key: PartitionKey) {
        self.requests += 1;
        *self.per_key_requests.entry(key).or_default() += 1;
    }

    /// Records an insertion or replacement.
    pub fn record_insertion(&mut self) {
        self.insertions += 1;
    }

    /// Records that one partition left the cache.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Records the result of one store load.
    pub fn record_load(&mut self, succeeded: bool) {
        if succeeded {
            self.loads += 1;
        } else {
            self.load_failures += 1;
        }
    }

    /// Misses so far.
    pub fn misses(&self) -> u64 {
        self.requests - self.hits
    }

    /// Hits divided by requests, or 0.0 before the first request.
    pub fn hit_rate(&self) -> f64 {
        if self.requests > 0 {
            self.hits as f64 / self.requests as f64
        } else {
            0.0
        }
    }

    /// Misses divided by requests, or 0.0 before the first request.
    pub fn miss_rate(&self) -> f64 {
        if self.requests > 0 {
            self.misses() as f64 / self.requests as f64
        } else {
            0.0
        }
    }

    /// Lookups recorded for `key`.
    pub fn requests_for(&self, key: &PartitionKey) -> u64 {
        self.per_key_requests.get(key).copied().unwrap_or(0)
    }

    /// Converts the counters to a deterministically ordered map.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("requests".to_string(), self.requests as f64);
        metrics.insert("cache_hits".to_string(), self.hits as f64);
        metrics.insert("cache_misses".to_string(), self.misses() as f64);
        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("miss_rate".to_string(), self.miss_rate());
        metrics.insert("insertions".to_string(), self.insertions as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("loads".to_string(), self.loads as f64);
        metrics.insert("load_failures".to_string(), self.load_failures as f64);
        if self.requests > 0 {
            metrics.insert(
                "eviction_rate".to_string(),
                self.evictions as f64 / self.requests as f64,
            );
        }
        metrics
    }
}

/// Trait for components that expose counters.
pub trait ComponentMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Component name used to prefix merged snapshots, e.g. `"cache"`.
    fn component_name(&self) -> &'static str;
}

/// Merges several components into one map keyed `<component>.<metric>`.
pub fn merged_metrics(components: &[&dyn ComponentMetrics]) -> BTreeMap<String, f64> {
    let mut merged = BTreeMap::new();
    for component in components {
        let prefix = component.component_name();
        for (name, value) in component.metrics() {
            merged.insert(format!("{prefix}.{name}"), value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    #[test]
    fn test_hit_rate_counts_per_key() {
        let a = PartitionKey::new(Language::Russian, 'а');
        let b = PartitionKey::new(Language::Russian, 'б');
        let mut stats = CacheStatistics::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_miss(a);
        stats.record_hit(a);
        stats.record_hit(a);
        stats.record_miss(b);

        assert_eq!(stats.requests, 4);
        assert_eq!(stats.misses(), 2);
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.requests_for(&a), 3);
        assert_eq!(stats.requests_for(&b), 1);
    }

    #[test]
    fn test_merged_metrics_prefixes_names() {
        struct Fixed;
        impl ComponentMetrics for Fixed {
            fn metrics(&self) -> BTreeMap<String, f64> {
                CacheStatistics::default().to_btreemap()
            }
            fn component_name(&self) -> &'static str {
                "cache"
            }
        }
        let merged = merged_metrics(&[&Fixed]);
        assert_eq!(merged.get("cache.requests"), Some(&0.0));
        assert!(!merged.contains_key("cache.eviction_rate"));
    }
}
