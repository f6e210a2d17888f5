// Synthetic spell-check workloads

use crate::models::Request;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use spellcache::Language;

/// Draws words from a vocabulary with Zipf-like popularity
///
/// The vocabulary is shuffled once so that popular words are spread across
/// initial letters instead of clustering at the start of the alphabet.
/// Word `rank` is drawn with probability proportional to `1 / (rank + 1)^skew`.
#[derive(Debug)]
pub struct WorkloadGenerator {
    vocabulary: Vec<String>,
    /// Cumulative, normalized popularity weights
    cumulative: Vec<f64>,
    misspell_rate: f64,
    rng: StdRng,
}

impl WorkloadGenerator {
    /// Create a generator over `vocabulary`
    pub fn new(mut vocabulary: Vec<String>, skew: f64, misspell_rate: f64, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        vocabulary.shuffle(&mut rng);

        let mut total = 0.0;
        let mut cumulative: Vec<f64> = (0..vocabulary.len())
            .map(|rank| {
                total += 1.0 / ((rank + 1) as f64).powf(skew);
                total
            })
            .collect();
        for weight in &mut cumulative {
            *weight /= total;
        }

        Self {
            vocabulary,
            cumulative,
            misspell_rate: misspell_rate.clamp(0.0, 1.0),
            rng,
        }
    }

    /// Number of distinct words that can be drawn
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Draw one word, misspelled with the configured probability
    pub fn next_word(&mut self) -> Option<String> {
        if self.vocabulary.is_empty() {
            return None;
        }
        let target: f64 = self.rng.gen();
        let rank = self
            .cumulative
            .partition_point(|&weight| weight < target)
            .min(self.vocabulary.len() - 1);
        let word = self.vocabulary[rank].clone();
        if self.rng.gen::<f64>() < self.misspell_rate {
            Some(misspell(&word, &mut self.rng))
        } else {
            Some(word)
        }
    }

    /// Build a batch request of `batch_size` words
    pub fn next_request(&mut self, language: Language, batch_size: usize) -> Request {
        let words: Vec<String> = (0..batch_size).filter_map(|_| self.next_word()).collect();
        let text = words.join(" ");
        Request {
            language,
            words,
            text,
        }
    }
}

/// Swap two adjacent letters, or double the only letter of a one-letter word
fn misspell(word: &str, rng: &mut impl Rng) -> String {
    let mut chars: Vec<char> = word.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => chars.repeat(2).into_iter().collect(),
        len => {
            let at = rng.gen_range(0..len - 1);
            if chars[at] == chars[at + 1] {
                // swapping equal letters changes nothing
                chars.remove(at);
            } else {
                chars.swap(at, at + 1);
            }
            chars.into_iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vocabulary(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("word{i}")).collect()
    }

    #[test]
    fn test_seeded_generators_repeat() {
        let mut a = WorkloadGenerator::new(vocabulary(100), 1.0, 0.2, Some(7));
        let mut b = WorkloadGenerator::new(vocabulary(100), 1.0, 0.2, Some(7));
        for _ in 0..50 {
            assert_eq!(a.next_word(), b.next_word());
        }
    }

    #[test]
    fn test_empty_vocabulary() {
        let mut generator = WorkloadGenerator::new(Vec::new(), 1.0, 0.0, Some(1));
        assert_eq!(generator.next_word(), None);
        let request = generator.next_request(Language::English, 5);
        assert!(request.words.is_empty());
        assert!(request.text.is_empty());
    }

    #[test]
    fn test_without_misspellings_words_come_from_vocabulary() {
        let words = vocabulary(20);
        let mut generator = WorkloadGenerator::new(words.clone(), 1.0, 0.0, Some(3));
        let request = generator.next_request(Language::English, 30);
        assert_eq!(request.words.len(), 30);
        assert!(request.words.iter().all(|w| words.contains(w)));
        assert_eq!(request.text.split(' ').count(), 30);
    }

    #[test]
    fn test_skew_concentrates_draws() {
        let mut generator = WorkloadGenerator::new(vocabulary(1_000), 1.2, 0.0, Some(11));
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..5_000 {
            if let Some(word) = generator.next_word() {
                *counts.entry(word).or_default() += 1;
            }
        }
        let mut frequencies: Vec<usize> = counts.into_values().collect();
        frequencies.sort_unstable_by(|a, b| b.cmp(a));
        let top_ten: usize = frequencies.iter().take(10).sum();
        // uniform draws would give the top ten words roughly 1% of the traffic
        assert!(top_ten > 1_000, "top ten words drew only {top_ten}");
    }

    #[test]
    fn test_misspell_changes_word() {
        let mut rng = StdRng::seed_from_u64(5);
        for word in ["кэш", "ab", "aab", "x"] {
            assert_ne!(misspell(word, &mut rng), word);
        }
        assert_eq!(misspell("x", &mut rng), "xx");
    }
}
