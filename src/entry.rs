//! Cache Entry Type
//!
//! A [`CacheEntry`] is what the LRU stores for each resident partition: the
//! shared word list plus the bookkeeping the monitor and the preloader read
//! when choosing what to evict.
//!
//! # Memory Layout
//!
//! - `partition: Arc<DictionaryPartition>` - 8 bytes, the words live behind it
//! - `hits: u64` - 8 bytes
//! - `inserted_at`, `last_accessed: Instant` - 16 bytes each on most targets
//!
//! The word list dominates; entry overhead is negligible next to it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::language::PartitionKey;
use crate::partition::DictionaryPartition;

/// A resident partition and its access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    partition: Arc<DictionaryPartition>,
    hits: u64,
    inserted_at: Instant,
    last_accessed: Instant,
}

impl CacheEntry {
    /// Wraps a partition that is being inserted now.
    pub fn new(partition: Arc<DictionaryPartition>) -> Self {
        let now = Instant::now();
        Self {
            partition,
            hits: 0,
            inserted_at: now,
            last_accessed: now,
        }
    }

    /// Key of the wrapped partition.
    #[inline]
    pub fn key(&self) -> PartitionKey {
        self.partition.key()
    }

    /// Shared handle to the partition.
    #[inline]
    pub fn partition(&self) -> &Arc<DictionaryPartition> {
        &self.partition
    }

    /// Hits recorded since insertion.
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Records a hit.
    #[inline]
    pub fn touch(&mut self) {
        self.hits += 1;
        self.last_accessed = Instant::now();
    }

    /// Time since insertion.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    /// Time since the last hit, or since insertion if never hit.
    pub fn idle(&self) -> Duration {
        self.last_accessed.elapsed()
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            key: self.key(),
            words: self.partition.len(),
            footprint_bytes: self.partition.footprint_bytes(),
            hits: self.hits,
            age: self.age(),
            idle: self.idle(),
        }
    }
}

/// Read-only view of one resident partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Partition key.
    pub key: PartitionKey,
    /// Number of words.
    pub words: usize,
    /// Estimated footprint in bytes.
    pub footprint_bytes: u64,
    /// Hits since insertion.
    pub hits: u64,
    /// Time since insertion.
    pub age: Duration,
    /// Time since the last hit.
    pub idle: Duration,
}
