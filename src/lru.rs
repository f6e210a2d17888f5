//! Least Recently Used (LRU) segment holding resident partitions.
//!
//! This is the single-threaded core of [`PartitionCache`](crate::PartitionCache):
//! a key map pointing into a recency list. The cache wraps it in a mutex and
//! adds loading, statistics snapshots and pressure handling on top.
//!
//! # Performance Characteristics
//!
//! - Get, insert, remove, evict: O(1)
//! - Capacity shrink: O(evicted)
//! - Snapshots: O(resident)
//!
//! Resident counts are small (tens of partitions), the word lists behind
//! them are not. Eviction only drops the cache's `Arc`; readers that still
//! hold a partition keep it alive.

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::entry::{CacheEntry, EntrySnapshot};
use crate::language::PartitionKey;
use crate::list::{Node, RecencyList};
use crate::metrics::CacheStatistics;
use crate::partition::DictionaryPartition;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// LRU ordering plus hit/miss statistics for resident partitions.
///
/// # Safety
///
/// `map` holds raw pointers into `list`. A pointer stays valid until its
/// node is removed from the list, and every removal goes through this type,
/// which drops the map entry at the same time.
pub(crate) struct PartitionLru {
    capacity: NonZeroUsize,
    list: RecencyList<CacheEntry>,
    map: HashMap<PartitionKey, *mut Node<CacheEntry>>,
    stats: CacheStatistics,
}

// SAFETY: PartitionLru owns every node its pointers refer to, and all access
// goes through &mut self or &self of the owning value.
unsafe impl Send for PartitionLru {}

impl PartitionLru {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        PartitionLru {
            capacity,
            list: RecencyList::new(),
            map: HashMap::with_capacity(capacity.get().next_power_of_two()),
            stats: CacheStatistics::default(),
        }
    }

    #[inline]
    pub(crate) fn cap(&self) -> NonZeroUsize {
        self.capacity
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub(crate) fn stats(&self) -> &CacheStatistics {
        &self.stats
    }

    #[inline]
    pub(crate) fn stats_mut(&mut self) -> &mut CacheStatistics {
        &mut self.stats
    }

    /// Looks up `key`, promoting it and recording a hit or a miss.
    pub(crate) fn get(&mut self, key: &PartitionKey) -> Option<Arc<DictionaryPartition>> {
        let Some(node) = self.map.get(key).copied() else {
            self.stats.record_miss(*key);
            return None;
        };
        // SAFETY: node comes from our map, so it is a live value node of `list`
        unsafe {
            self.list.move_to_front(node);
            let entry = (*node).value_mut();
            entry.touch();
            self.stats.record_hit(*key);
            Some(Arc::clone(entry.partition()))
        }
    }

    /// Looks up `key` without promoting it or touching statistics.
    pub(crate) fn peek(&self, key: &PartitionKey) -> Option<Arc<DictionaryPartition>> {
        let node = self.map.get(key).copied()?;
        // SAFETY: node comes from our map
        unsafe { Some(Arc::clone((*node).value().partition())) }
    }

    #[inline]
    pub(crate) fn contains(&self, key: &PartitionKey) -> bool {
        self.map.contains_key(key)
    }

    /// Inserts or replaces a partition as most recent, returning whatever the
    /// capacity bound pushed out.
    pub(crate) fn insert(
        &mut self,
        partition: Arc<DictionaryPartition>,
    ) -> Vec<Arc<DictionaryPartition>> {
        let key = partition.key();
        self.stats.record_insertion();

        if let Some(node) = self.map.get(&key).copied() {
            // SAFETY: node comes from our map
            unsafe {
                self.list.move_to_front(node);
                *(*node).value_mut() = CacheEntry::new(partition);
            }
            return Vec::new();
        }

        let node = self.list.push_front(CacheEntry::new(partition));
        self.map.insert(key, node);
        self.evict_to(self.capacity.get())
    }

    /// Removes `key` if resident.
    pub(crate) fn remove(&mut self, key: &PartitionKey) -> Option<Arc<DictionaryPartition>> {
        let node = self.map.remove(key)?;
        // SAFETY: node came from our map and was just unmapped, so it is removed exactly once
        let entry = unsafe { self.list.remove(node) };
        self.stats.record_eviction();
        Some(Arc::clone(entry.partition()))
    }

    /// Evicts the least recently used partition.
    pub(crate) fn pop_lru(&mut self) -> Option<Arc<DictionaryPartition>> {
        let entry = self.list.pop_back()?;
        self.map.remove(&entry.key());
        self.stats.record_eviction();
        Some(Arc::clone(entry.partition()))
    }

    /// Key of the least recently used partition.
    pub(crate) fn lru_key(&self) -> Option<PartitionKey> {
        self.list.back().map(CacheEntry::key)
    }

    /// Changes capacity, evicting from the LRU end if it shrank.
    pub(crate) fn set_capacity(&mut self, capacity: NonZeroUsize) -> Vec<Arc<DictionaryPartition>> {
        self.capacity = capacity;
        self.evict_to(capacity.get())
    }

    /// Drops every resident partition; statistics are kept.
    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.map.len();
        self.map.clear();
        self.list.clear();
        removed
    }

    /// Resident keys, most recent first.
    pub(crate) fn keys_by_recency(&self) -> Vec<PartitionKey> {
        self.list.iter().map(CacheEntry::key).collect()
    }

    /// Snapshots of resident entries, most recent first.
    pub(crate) fn snapshots(&self) -> Vec<EntrySnapshot> {
        self.list.iter().map(CacheEntry::snapshot).collect()
    }

    /// Sum over resident partitions.
    pub(crate) fn fold_partitions<B>(
        &self,
        init: B,
        mut f: impl FnMut(B, &DictionaryPartition) -> B,
    ) -> B {
        self.list
            .iter()
            .fold(init, |acc, entry| f(acc, entry.partition()))
    }

    fn evict_to(&mut self, limit: usize) -> Vec<Arc<DictionaryPartition>> {
        let mut evicted = Vec::new();
        while self.map.len() > limit {
            match self.pop_lru() {
                Some(partition) => evicted.push(partition),
                None => break,
            }
        }
        evicted
    }
}

impl core::fmt::Debug for PartitionLru {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PartitionLru")
            .field("capacity", &self.capacity)
            .field("len", &self.map.len())
            .field("keys", &self.keys_by_recency())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use scoped_threadpool::Pool;
    use std::sync::Mutex;

    fn key(letter: char) -> PartitionKey {
        PartitionKey::new(Language::English, letter)
    }

    fn make_partition(letter: char) -> Arc<DictionaryPartition> {
        let word = format!("{letter}{letter}");
        Arc::new(DictionaryPartition::from_words(key(letter), [word]))
    }

    fn make_lru(cap: usize) -> PartitionLru {
        PartitionLru::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn test_get_records_hits_and_misses() {
        let mut lru = make_lru(2);
        assert!(lru.get(&key('a')).is_none());
        lru.insert(make_partition('a'));
        assert!(lru.get(&key('a')).is_some());
        assert_eq!(lru.stats().requests, 2);
        assert_eq!(lru.stats().hits, 1);
        assert_eq!(lru.stats().requests_for(&key('a')), 2);
    }

    #[test]
    fn test_insert_evicts_least_recent() {
        let mut lru = make_lru(2);
        assert!(lru.insert(make_partition('a')).is_empty());
        assert!(lru.insert(make_partition('b')).is_empty());
        lru.get(&key('a'));
        let evicted = lru.insert(make_partition('c'));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key(), key('b'));
        assert_eq!(lru.keys_by_recency(), vec![key('c'), key('a')]);
    }

    #[test]
    fn test_replace_keeps_len() {
        let mut lru = make_lru(2);
        lru.insert(make_partition('a'));
        lru.insert(make_partition('b'));
        let replacement = Arc::new(DictionaryPartition::from_words(key('a'), ["ant", "arc"]));
        assert!(lru.insert(replacement).is_empty());
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.peek(&key('a')).unwrap().len(), 2);
        assert_eq!(lru.lru_key(), Some(key('b')));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut lru = make_lru(2);
        lru.insert(make_partition('a'));
        lru.insert(make_partition('b'));
        assert!(lru.peek(&key('a')).is_some());
        assert_eq!(lru.stats().requests, 0);
        assert_eq!(lru.lru_key(), Some(key('a')));
    }

    #[test]
    fn test_shrink_capacity() {
        let mut lru = make_lru(4);
        for letter in ['a', 'b', 'c', 'd'] {
            lru.insert(make_partition(letter));
        }
        let evicted = lru.set_capacity(NonZeroUsize::new(2).unwrap());
        let evicted: Vec<_> = evicted.iter().map(|p| p.key()).collect();
        assert_eq!(evicted, vec![key('a'), key('b')]);
        assert_eq!(lru.keys_by_recency(), vec![key('d'), key('c')]);
        assert_eq!(lru.stats().evictions, 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut lru = make_lru(3);
        lru.insert(make_partition('a'));
        lru.insert(make_partition('b'));
        assert!(lru.remove(&key('a')).is_some());
        assert!(lru.remove(&key('a')).is_none());
        assert!(!lru.contains(&key('a')));
        assert_eq!(lru.clear(), 1);
        assert!(lru.is_empty());
        assert_eq!(lru.stats().insertions, 2);
    }

    #[test]
    fn test_evicted_partition_stays_readable() {
        let mut lru = make_lru(1);
        lru.insert(make_partition('a'));
        let held = lru.get(&key('a')).unwrap();
        lru.insert(make_partition('b'));
        assert!(!lru.contains(&key('a')));
        assert!(held.contains("aa"));
    }

    #[test]
    fn test_lru_high_contention() {
        let lru = Mutex::new(make_lru(8));
        let mut pool = Pool::new(8);
        pool.scoped(|scope| {
            for t in 0..8u32 {
                let lru = &lru;
                scope.execute(move || {
                    for i in 0..400u32 {
                        let letter = char::from(b'a' + ((i + t) % 26) as u8);
                        let mut guard = lru.lock().unwrap();
                        if i % 2 == 0 {
                            guard.insert(make_partition(letter));
                        } else {
                            let _ = guard.get(&key(letter));
                        }
                    }
                });
            }
        });
        let guard = lru.lock().unwrap();
        assert!(guard.len() <= 8);
        assert_eq!(guard.keys_by_recency().len(), guard.len());
    }
}
