//! Partition stores: where word lists come from.
//!
//! The cache only knows the [`PartitionStore`] trait. Two implementations
//! ship with the crate:
//!
//! - [`FilePartitionStore`] reads `<root>/<lang>_<letter>.txt`, one word per
//!   line. Blank lines and lines starting with `#` are skipped, words are
//!   trimmed and lowercased.
//! - [`MemoryPartitionStore`] serves word lists from memory and counts every
//!   load, which makes it the store of choice in tests.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::language::{normalize_word, Language, PartitionKey};
use crate::partition::WordSet;

/// Default upper bound for a single partition file.
pub const DEFAULT_MAX_PARTITION_BYTES: u64 = 64 * 1024 * 1024;

/// Source of partition word lists.
///
/// Implementations must be safe to call concurrently for different keys.
/// The cache guarantees at most one in-flight call per key.
#[async_trait]
pub trait PartitionStore: Send + Sync + fmt::Debug {
    /// Loads every word of `key`.
    ///
    /// Returns [`StoreError::NotFound`] when no list exists and
    /// [`StoreError::Excluded`] for letters that never start a word.
    async fn load_partition(&self, key: &PartitionKey) -> Result<WordSet, StoreError>;
}

/// Parses a word list: one word per line, `#` comments and blanks ignored.
pub fn parse_word_list(content: &str) -> WordSet {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_word)
        .collect()
}

/// Reads partitions from text files in one directory.
#[derive(Debug, Clone)]
pub struct FilePartitionStore {
    root: PathBuf,
    max_partition_bytes: u64,
}

impl FilePartitionStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_partition_bytes: DEFAULT_MAX_PARTITION_BYTES,
        }
    }

    /// Rejects files larger than `limit` bytes.
    pub fn with_max_partition_bytes(mut self, limit: u64) -> Self {
        self.max_partition_bytes = limit;
        self
    }

    /// Directory holding the partition files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &PartitionKey) -> PathBuf {
        self.root.join(format!("{}.txt", key.file_stem()))
    }

    /// Keys for which a file exists, sorted.
    pub fn available_partitions(&self, language: Language) -> Vec<PartitionKey> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{root}/{}_*.txt", language.code());
        let Ok(paths) = glob::glob(&pattern) else {
            return Vec::new();
        };
        let prefix = format!("{}_", language.code());
        let mut keys: Vec<PartitionKey> = paths
            .filter_map(Result::ok)
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_owned();
                let mut letters = stem.strip_prefix(&prefix)?.chars();
                let letter = letters.next()?;
                letters.next().is_none().then(|| PartitionKey::new(language, letter))
            })
            .filter(|key| language.contains_letter(key.letter))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[async_trait]
impl PartitionStore for FilePartitionStore {
    async fn load_partition(&self, key: &PartitionKey) -> Result<WordSet, StoreError> {
        if key.is_excluded() {
            return Err(StoreError::Excluded(*key));
        }
        let path = self.path_for(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*key))
            }
            Err(err) => return Err(StoreError::io(*key, err)),
        };
        if metadata.len() > self.max_partition_bytes {
            return Err(StoreError::TooLarge {
                key: *key,
                size: metadata.len(),
                limit: self.max_partition_bytes,
            });
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| StoreError::io(*key, err))?;
        let words = parse_word_list(&content);
        debug!(partition = %key, words = words.len(), path = %path.display(), "read partition file");
        Ok(words)
    }
}

/// In-memory store that counts loads per key.
#[derive(Debug, Default)]
pub struct MemoryPartitionStore {
    partitions: RwLock<HashMap<PartitionKey, WordSet>>,
    loads: Mutex<HashMap<PartitionKey, usize>>,
    latency: Option<Duration>,
}

impl MemoryPartitionStore {
    /// Empty store with no artificial latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds or replaces the words of one partition.
    pub fn insert<I, S>(&self, key: PartitionKey, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words.into_iter().map(|w| normalize_word(w.as_ref())).collect();
        self.partitions.write().insert(key, words);
    }

    /// Splits `words` by initial letter and stores each group.
    pub fn insert_words<I, S>(&self, language: Language, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut partitions = self.partitions.write();
        for word in words {
            let word = normalize_word(word.as_ref());
            if let Some(key) = PartitionKey::for_word(&word, language) {
                partitions.entry(key).or_default().insert(word);
            }
        }
    }

    /// Loads served for `key` so far, including failed ones.
    pub fn load_count(&self, key: &PartitionKey) -> usize {
        self.loads.lock().get(key).copied().unwrap_or(0)
    }

    /// Loads served across all keys.
    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }
}

#[async_trait]
impl PartitionStore for MemoryPartitionStore {
    async fn load_partition(&self, key: &PartitionKey) -> Result<WordSet, StoreError> {
        *self.loads.lock().entry(*key).or_default() += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if key.is_excluded() {
            return Err(StoreError::Excluded(*key));
        }
        let words = self.partitions.read().get(key).cloned();
        trace!(partition = %key, found = words.is_some(), "memory store load");
        words.ok_or(StoreError::NotFound(*key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_word_list() {
        let words = parse_word_list("# header\n  Абзац \n\nабажур\n#comment\nАБЗАЦ\n");
        assert_eq!(words.len(), 2);
        assert!(words.contains("абзац"));
        assert!(words.contains("абажур"));
    }

    #[tokio::test]
    async fn test_file_store_loads_and_classifies_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ru_а.txt"), "абзац\nабажур\n").unwrap();
        let store = FilePartitionStore::new(dir.path());

        let a = PartitionKey::new(Language::Russian, 'а');
        let words = store.load_partition(&a).await.unwrap();
        assert_eq!(words.len(), 2);

        let missing = PartitionKey::new(Language::Russian, 'б');
        assert!(matches!(
            store.load_partition(&missing).await,
            Err(StoreError::NotFound(_))
        ));

        let excluded = PartitionKey::new(Language::Russian, 'ъ');
        assert!(matches!(
            store.load_partition(&excluded).await,
            Err(StoreError::Excluded(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en_a.txt"), "apple\napricot\n").unwrap();
        let store = FilePartitionStore::new(dir.path()).with_max_partition_bytes(4);
        let key = PartitionKey::new(Language::English, 'a');
        let err = store.load_partition(&key).await.unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 4, .. }));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_available_partitions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["en_a.txt", "en_b.txt", "en_ab.txt", "ru_а.txt", "notes.txt"] {
            fs::write(dir.path().join(name), "x\n").unwrap();
        }
        let store = FilePartitionStore::new(dir.path());
        assert_eq!(
            store.available_partitions(Language::English),
            vec![
                PartitionKey::new(Language::English, 'a'),
                PartitionKey::new(Language::English, 'b'),
            ]
        );
        assert_eq!(
            store.available_partitions(Language::Russian),
            vec![PartitionKey::new(Language::Russian, 'а')]
        );
    }

    #[tokio::test]
    async fn test_memory_store_counts_loads() {
        let store = MemoryPartitionStore::new();
        store.insert_words(Language::English, ["Apple", "avocado", "banana", "42"]);
        let a = PartitionKey::new(Language::English, 'a');
        let z = PartitionKey::new(Language::English, 'z');

        assert_eq!(store.load_partition(&a).await.unwrap().len(), 2);
        assert!(store.load_partition(&z).await.is_err());
        assert_eq!(store.load_count(&a), 1);
        assert_eq!(store.load_count(&z), 1);
        assert_eq!(store.total_loads(), 2);
    }
}
