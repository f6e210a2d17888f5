//! Dictionary input handling
//!
//! Reads flat word lists, splits them into per-letter partition files and
//! loads the vocabulary of a partition directory for simulation.

use spellcache::store::parse_word_list;
use spellcache::{FilePartitionStore, Language, PartitionKey};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

/// What [`split_word_list`] wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    /// Partition files written
    pub files: usize,
    /// Distinct words written across all files
    pub words: usize,
    /// Input words that belong to no partition of the language
    pub skipped: usize,
}

/// Read a flat word list in partition file format, deduplicated and sorted
pub fn read_word_list<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let mut words: Vec<String> = parse_word_list(&content).into_iter().collect();
    words.sort_unstable();
    Ok(words)
}

/// Write `words` into `<output>/<lang>_<letter>.txt` files, sorted and deduplicated
///
/// Words that start with a letter outside the language's alphabet, or with a
/// letter that never starts a word, are counted as skipped.
pub fn split_word_list<P: AsRef<Path>>(
    words: &[String],
    language: Language,
    output: P,
) -> io::Result<SplitSummary> {
    let output = output.as_ref();
    let mut partitions: BTreeMap<PartitionKey, BTreeSet<&str>> = BTreeMap::new();
    let mut skipped = 0;

    for word in words {
        match PartitionKey::for_word(word, language) {
            Some(key) if !key.is_excluded() => {
                partitions.entry(key).or_default().insert(word.as_str());
            }
            _ => skipped += 1,
        }
    }

    fs::create_dir_all(output)?;
    let store = FilePartitionStore::new(output);
    let mut written = 0;
    for (key, words) in &partitions {
        let mut content = words.iter().copied().collect::<Vec<_>>().join("\n");
        content.push('\n');
        fs::write(store.path_for(key), content)?;
        written += words.len();
    }

    Ok(SplitSummary {
        files: partitions.len(),
        words: written,
        skipped,
    })
}

/// Load every word of `language` found in a partition directory, sorted
pub fn load_vocabulary<P: AsRef<Path>>(dir: P, language: Language) -> io::Result<Vec<String>> {
    let store = FilePartitionStore::new(dir.as_ref());
    let mut vocabulary = Vec::new();
    for key in store.available_partitions(language) {
        let content = fs::read_to_string(store.path_for(&key))?;
        let mut words: Vec<String> = parse_word_list(&content).into_iter().collect();
        words.sort_unstable();
        vocabulary.extend(words);
    }
    Ok(vocabulary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_word_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "# dictionary\nСобака\n\n  кот \nкот\n").unwrap();
        let words = read_word_list(&path).unwrap();
        assert_eq!(words, vec!["кот", "собака"]);
    }

    #[test]
    fn test_split_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let words: Vec<String> = ["кот", "кит", "собака", "кот", "ъ", "dog"]
            .iter()
            .map(|w| w.to_string())
            .collect();
        let summary = split_word_list(&words, Language::Russian, dir.path()).unwrap();
        assert_eq!(
            summary,
            SplitSummary {
                files: 2,
                words: 3,
                skipped: 2,
            }
        );

        let content = fs::read_to_string(dir.path().join("ru_к.txt")).unwrap();
        assert_eq!(content, "кит\nкот\n");

        let vocabulary = load_vocabulary(dir.path(), Language::Russian).unwrap();
        assert_eq!(vocabulary.len(), 3);
        assert!(vocabulary.contains(&"собака".to_string()));
        assert!(load_vocabulary(dir.path(), Language::English)
            .unwrap()
            .is_empty());
    }
}
