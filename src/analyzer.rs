//! Text analysis for predictive preloading.
//!
//! Ranks the initial letters of a text's words by how often they occur.
//! Ties keep the order in which letters first appeared, so the ranking is
//! deterministic for a given text.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;

use crate::language::{Language, PartitionKey};

/// A partition key and how many words of the text it would serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankedKey {
    /// Partition key.
    pub key: PartitionKey,
    /// Words of the text starting with the key's letter.
    pub words: usize,
}

/// Everything the preloader needs to know about one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextAnalysis {
    /// Language the text was analyzed as.
    pub language: Language,
    /// Characters in the text.
    pub text_chars: usize,
    /// Words found.
    pub word_count: usize,
    /// Occurrences of every letter of the alphabet in the text.
    pub letter_frequency: BTreeMap<char, usize>,
    /// Initial letters ranked by word count, ties in first-seen order.
    pub ranked: Vec<RankedKey>,
}

impl TextAnalysis {
    /// Keys in rank order.
    pub fn keys(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.ranked.iter().map(|r| r.key)
    }

    /// The `n` most frequent letters of the whole text.
    pub fn top_letters(&self, n: usize) -> Vec<(char, usize)> {
        let mut letters: Vec<(char, usize)> =
            self.letter_frequency.iter().map(|(&c, &n)| (c, n)).collect();
        letters.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        letters.truncate(n);
        letters
    }
}

/// Stateless text analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextAnalyzer {
    short_text_chars: usize,
}

impl TextAnalyzer {
    /// Analyzer that pads predictions of texts shorter than
    /// `short_text_chars` with common initial letters.
    pub fn new(short_text_chars: usize) -> Self {
        Self { short_text_chars }
    }

    /// Tokenizes `text` and ranks its initial letters.
    pub fn analyze(&self, text: &str, language: Language) -> TextAnalysis {
        let words = language.tokenize(text);
        let mut letter_frequency = BTreeMap::new();
        for letter in words.iter().flat_map(|w| w.chars()) {
            *letter_frequency.entry(letter).or_insert(0) += 1;
        }
        TextAnalysis {
            language,
            text_chars: text.chars().count(),
            word_count: words.len(),
            letter_frequency,
            ranked: rank_initials(&words, language),
        }
    }

    /// Keys worth warming for `analysis`, best first.
    ///
    /// The ranked initials, followed for short texts by the language's most
    /// common initials that the text did not already cover.
    pub fn predict(&self, analysis: &TextAnalysis) -> Vec<PartitionKey> {
        let mut keys: Vec<PartitionKey> = analysis.keys().collect();
        if analysis.text_chars < self.short_text_chars {
            for &letter in analysis.language.common_initials().iter().take(2) {
                let key = PartitionKey::new(analysis.language, letter);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Share of the text's words, in percent, whose partition is in `resident`.
    pub fn estimate_cache_efficiency(
        &self,
        text: &str,
        language: Language,
        resident: &[PartitionKey],
    ) -> f64 {
        let words = language.tokenize(text);
        if words.is_empty() {
            return 100.0;
        }
        let covered = words
            .iter()
            .filter_map(|w| PartitionKey::for_word(w, language))
            .filter(|key| key.is_excluded() || resident.contains(key))
            .count();
        covered as f64 * 100.0 / words.len() as f64
    }
}

/// Ranks initial letters by word count; ties keep first-seen order.
pub fn rank_initials(words: &[String], language: Language) -> Vec<RankedKey> {
    let mut counts: HashMap<PartitionKey, (usize, usize)> = HashMap::new();
    for word in words {
        if let Some(key) = PartitionKey::for_word(word, language) {
            let next_seen = counts.len();
            counts.entry(key).or_insert((0, next_seen)).0 += 1;
        }
    }
    let mut ranked: Vec<(PartitionKey, usize, usize)> = counts
        .into_iter()
        .map(|(key, (count, seen))| (key, count, seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .map(|(key, words, _)| RankedKey { key, words })
        .collect()
}
