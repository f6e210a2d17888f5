//! Loaded word lists.

use std::collections::HashSet;
use std::mem;
use std::time::Instant;

use crate::language::PartitionKey;

/// The words of one partition, as returned by a store.
pub type WordSet = HashSet<String>;

// Rough per-entry overhead of a `HashSet<String>` slot: control byte plus
// hash table padding.
const SLOT_OVERHEAD: usize = 8;

/// An immutable, shareable word list for one [`PartitionKey`].
///
/// Partitions are handed out as `Arc<DictionaryPartition>`, so a reader
/// holding one keeps using it even after the cache evicts it.
#[derive(Debug)]
pub struct DictionaryPartition {
    key: PartitionKey,
    words: WordSet,
    footprint_bytes: u64,
    loaded_at: Instant,
}

impl DictionaryPartition {
    /// Wraps a loaded word set.
    pub fn new(key: PartitionKey, words: WordSet) -> Self {
        let footprint_bytes = estimate_footprint(&words);
        Self {
            key,
            words,
            footprint_bytes,
            loaded_at: Instant::now(),
        }
    }

    /// A partition with no words, used for excluded or missing lists.
    pub fn empty(key: PartitionKey) -> Self {
        Self::new(key, WordSet::new())
    }

    /// Builds a partition from any list of words, normalizing each one.
    pub fn from_words<I, S>(key: PartitionKey, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| crate::language::normalize_word(w.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        Self::new(key, words)
    }

    /// Key this partition was loaded for.
    pub fn key(&self) -> PartitionKey {
        self.key
    }

    /// Exact membership test on an already normalized word.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` if the partition holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterates the words in no particular order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    /// Estimated heap footprint in bytes.
    pub fn footprint_bytes(&self) -> u64 {
        self.footprint_bytes
    }

    /// When the partition was built.
    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }
}

fn estimate_footprint(words: &WordSet) -> u64 {
    let per_word: usize = words
        .iter()
        .map(|w| w.capacity() + mem::size_of::<String>() + SLOT_OVERHEAD)
        .sum();
    (mem::size_of::<DictionaryPartition>() + per_word) as u64
}
