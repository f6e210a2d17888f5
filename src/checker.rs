//! Word validation on top of the partition cache.
//!
//! [`SpellChecker`] wires the cache, the memory monitor, the preloader and
//! the adaptive manager together and answers the only question callers
//! ask: is this word in the dictionary? Lookups never fail. A word whose
//! partition cannot be loaded is checked against a small built-in set of
//! essential words instead.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::adaptive::{AdaptiveMemoryManager, OptimizationStats, SystemHealth};
use crate::cache::{CacheStats, PartitionCache};
use crate::config::SpellcheckConfig;
use crate::error::ConfigError;
use crate::language::{normalize_word, Language, PartitionKey};
use crate::metrics::merged_metrics;
use crate::monitor::{MemoryMonitor, MemorySampler, MonitorStatus, ProcessMemorySampler};
use crate::preloader::{IntelligentPreloader, PreloadTask, PreloaderReport};
use crate::store::PartitionStore;

/// Verdict for one word of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordResult {
    /// The word as given.
    pub word: String,
    /// Whether the dictionary knows it.
    pub correct: bool,
}

/// Result of [`SpellChecker::check_text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Language the words were checked in.
    pub language: Language,
    /// One verdict per input word, in input order.
    pub results: Vec<WordResult>,
    /// Words found.
    pub correct: usize,
    /// Words not found.
    pub incorrect: usize,
    /// Whether the accompanying text started preloading.
    pub preload_triggered: bool,
    /// Time spent validating.
    pub elapsed: Duration,
}

impl BatchReport {
    /// The words that were not found, in input order.
    pub fn misspelled(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| !r.correct)
            .map(|r| r.word.as_str())
    }
}

/// Everything the administrative surface exposes, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct SpellcheckReport {
    /// Cache summary.
    pub cache: CacheStats,
    /// Resident partitions, most recently used first.
    pub cached_partitions: Vec<PartitionKey>,
    /// Estimated footprint of the resident partitions in MiB.
    pub cache_memory_mb: f64,
    /// Monitor status.
    pub monitor: MonitorStatus,
    /// Preloader counters and usage.
    pub preloader: PreloaderReport,
    /// Health grade and scores.
    pub health: SystemHealth,
    /// Adaptive manager history.
    pub optimization: OptimizationStats,
    /// Flat metrics of every component.
    pub metrics: BTreeMap<String, f64>,
}

/// Builder for [`SpellChecker`].
pub struct SpellCheckerBuilder {
    store: Arc<dyn PartitionStore>,
    config: SpellcheckConfig,
    sampler: Option<Arc<dyn MemorySampler>>,
    fallback: HashMap<Language, HashSet<String>>,
}

impl SpellCheckerBuilder {
    /// Replaces the default configuration.
    pub fn config(mut self, config: SpellcheckConfig) -> Self {
        self.config = config;
        self
    }

    /// Samples memory with `sampler` instead of reading the process RSS.
    pub fn sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Adds words to the fallback set of `language`.
    pub fn fallback_words<I, S>(mut self, language: Language, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fallback
            .entry(language)
            .or_default()
            .extend(words.into_iter().map(|w| normalize_word(w.as_ref())));
        self
    }

    /// Validates the configuration and builds the checker. Nothing runs in
    /// the background until [`SpellChecker::start`].
    pub fn build(self) -> Result<SpellChecker, ConfigError> {
        self.config.validate()?;
        let config = self.config;
        let cache = Arc::new(PartitionCache::new(config.cache.clone(), self.store));
        let sampler: Arc<dyn MemorySampler> = match self.sampler {
            Some(sampler) => sampler,
            None => Arc::new(ProcessMemorySampler::new()),
        };
        let monitor = Arc::new(MemoryMonitor::new(
            config.monitor.clone(),
            Arc::clone(&cache),
            sampler,
        ));
        let preloader = Arc::new(IntelligentPreloader::new(
            config.preloader.clone(),
            Arc::clone(&cache),
        ));
        let manager = Arc::new(AdaptiveMemoryManager::new(
            config.adaptive.clone(),
            Arc::clone(&cache),
            Arc::clone(&monitor),
            Arc::clone(&preloader),
        ));
        Ok(SpellChecker {
            config,
            cache,
            monitor,
            preloader,
            manager,
            fallback: self.fallback,
        })
    }
}

impl fmt::Debug for SpellCheckerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpellCheckerBuilder")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Dictionary lookups backed by a bounded, self-tuning partition cache.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use spellcache::{Language, MemoryPartitionStore, SpellChecker};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = Arc::new(MemoryPartitionStore::new());
/// store.insert_words(Language::English, ["cache", "partition"]);
/// let checker = SpellChecker::builder(store).build().unwrap();
///
/// assert!(checker.is_word_correct("Cache", Language::English).await);
/// assert!(!checker.is_word_correct("cahce", Language::English).await);
/// // built-in fallback words
/// assert!(checker.is_word_correct("hello", Language::English).await);
/// # });
/// ```
#[derive(Debug)]
pub struct SpellChecker {
    config: SpellcheckConfig,
    cache: Arc<PartitionCache>,
    monitor: Arc<MemoryMonitor>,
    preloader: Arc<IntelligentPreloader>,
    manager: Arc<AdaptiveMemoryManager>,
    fallback: HashMap<Language, HashSet<String>>,
}

impl SpellChecker {
    /// Starts building a checker over `store`. Each language's fallback set
    /// starts with its essential words.
    pub fn builder(store: Arc<dyn PartitionStore>) -> SpellCheckerBuilder {
        let fallback = Language::ALL
            .iter()
            .map(|&language| {
                let words = language
                    .essential_words()
                    .iter()
                    .map(|w| w.to_string())
                    .collect();
                (language, words)
            })
            .collect();
        SpellCheckerBuilder {
            store,
            config: SpellcheckConfig::default(),
            sampler: None,
            fallback,
        }
    }

    /// Starts memory monitoring and, if configured, automatic optimization.
    pub fn start(&self) {
        self.monitor.start_monitoring();
        if self.config.checker.auto_optimize {
            self.manager.start_automatic_optimization();
        }
        info!(auto_optimize = self.config.checker.auto_optimize, "spell checker started");
    }

    /// Stops every background loop. Safe to call more than once.
    pub fn shutdown(&self) {
        let monitor = self.monitor.stop_monitoring();
        let manager = self.manager.stop_automatic_optimization();
        if monitor || manager {
            info!("spell checker stopped");
        }
    }

    /// Returns `true` if `word` is in the dictionary of `language`.
    pub async fn is_word_correct(&self, word: &str, language: Language) -> bool {
        let word = normalize_word(word);
        if word.is_empty() {
            return false;
        }
        let Some(key) = PartitionKey::for_word(&word, language) else {
            return self.in_fallback(&word, language);
        };
        let partition = self.cache.get_or_load(key).await;
        partition.contains(&word) || self.in_fallback(&word, language)
    }

    /// Like [`is_word_correct`](Self::is_word_correct) with a language code.
    /// Unknown codes answer `false`.
    pub async fn is_word_correct_in(&self, word: &str, language_code: &str) -> bool {
        match language_code.parse::<Language>() {
            Ok(language) => self.is_word_correct(word, language).await,
            Err(err) => {
                debug!(error = %err, "rejecting lookup");
                false
            }
        }
    }

    /// Validates many words, loading each partition at most once.
    ///
    /// The result has one entry per input word, in input order.
    pub async fn validate_batch<S: AsRef<str>>(&self, words: &[S], language: Language) -> Vec<bool> {
        let mut results = vec![false; words.len()];
        let mut groups: BTreeMap<PartitionKey, Vec<(usize, String)>> = BTreeMap::new();
        for (index, word) in words.iter().enumerate() {
            let word = normalize_word(word.as_ref());
            if word.is_empty() {
                continue;
            }
            match PartitionKey::for_word(&word, language) {
                Some(key) => groups.entry(key).or_default().push((index, word)),
                None => results[index] = self.in_fallback(&word, language),
            }
        }
        for (key, group) in groups {
            let partition = self.cache.get_or_load(key).await;
            for (index, word) in group {
                results[index] = partition.contains(&word) || self.in_fallback(&word, language);
            }
        }
        results
    }

    /// Validates `words` and, if `text` is long enough, starts preloading
    /// for it. Every call is recorded as a usage observation.
    pub async fn check_text<S: AsRef<str>>(
        &self,
        words: &[S],
        language: Language,
        text: Option<&str>,
    ) -> BatchReport {
        let started = Instant::now();
        let text_length = text.map_or_else(
            || words.iter().map(|w| w.as_ref().chars().count()).sum(),
            |t| t.chars().count(),
        );

        let preload_triggered = match text {
            Some(text) if text_length > self.config.checker.preload_text_chars => {
                self.preloader.analyze_and_preload(text, language).is_some()
            }
            _ => false,
        };

        let verdicts = self.validate_batch(words, language).await;
        let results: Vec<WordResult> = words
            .iter()
            .zip(verdicts)
            .map(|(word, correct)| WordResult {
                word: word.as_ref().to_string(),
                correct,
            })
            .collect();
        let correct = results.iter().filter(|r| r.correct).count();

        let owned: Vec<String> = words.iter().map(|w| w.as_ref().to_string()).collect();
        self.manager.update_usage_data(text_length, language, &owned);

        let report = BatchReport {
            language,
            incorrect: results.len() - correct,
            correct,
            results,
            preload_triggered,
            elapsed: started.elapsed(),
        };
        debug!(
            %language,
            words = report.results.len(),
            incorrect = report.incorrect,
            preload_triggered,
            "text checked"
        );
        report
    }

    /// Starts preloading the partitions `text` is likely to need.
    pub fn preload_text(&self, text: &str, language: Language) -> Option<PreloadTask> {
        self.preloader.analyze_and_preload(text, language)
    }

    /// Words of `language` currently resident in the cache.
    pub fn dictionary_size(&self, language: Language) -> usize {
        self.cache
            .entry_snapshots()
            .iter()
            .filter(|e| e.key.language == language)
            .map(|e| e.words)
            .sum()
    }

    /// Snapshot of every component.
    pub fn report(&self) -> SpellcheckReport {
        SpellcheckReport {
            cache: self.cache.stats(),
            cached_partitions: self.cache.cached_partitions(),
            cache_memory_mb: self.cache.memory_usage_mb(),
            monitor: self.monitor.status(),
            preloader: self.preloader.report(),
            health: self.manager.system_health(),
            optimization: self.manager.optimization_stats(),
            metrics: merged_metrics(&[
                &*self.cache,
                &*self.monitor,
                &*self.preloader,
                &*self.manager,
            ]),
        }
    }

    /// The configuration the checker was built with.
    pub fn config(&self) -> &SpellcheckConfig {
        &self.config
    }

    /// The partition cache.
    pub fn cache(&self) -> &Arc<PartitionCache> {
        &self.cache
    }

    /// The memory monitor.
    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    /// The preloader.
    pub fn preloader(&self) -> &Arc<IntelligentPreloader> {
        &self.preloader
    }

    /// The adaptive manager.
    pub fn manager(&self) -> &Arc<AdaptiveMemoryManager> {
        &self.manager
    }

    fn in_fallback(&self, word: &str, language: Language) -> bool {
        self.fallback
            .get(&language)
            .is_some_and(|words| words.contains(word))
    }
}

impl Drop for SpellChecker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ManualSampler;
    use crate::store::MemoryPartitionStore;

    fn make_checker() -> (Arc<MemoryPartitionStore>, SpellChecker) {
        let store = Arc::new(MemoryPartitionStore::new());
        store.insert_words(Language::Russian, ["привет", "мир", "память", "кэш"]);
        store.insert_words(Language::English, ["apple", "banana", "cherry"]);
        let checker = SpellChecker::builder(store.clone())
            .sampler(Arc::new(ManualSampler::new(0)))
            .build()
            .unwrap();
        (store, checker)
    }

    #[tokio::test]
    async fn test_word_lookup_is_normalized() {
        let (_, checker) = make_checker();
        assert!(checker.is_word_correct("  Привет ", Language::Russian).await);
        assert!(!checker.is_word_correct("превет", Language::Russian).await);
        assert!(!checker.is_word_correct("", Language::Russian).await);
    }

    #[tokio::test]
    async fn test_fallback_words() {
        let (_, checker) = make_checker();
        // no partition for 'а' exists, the essential words still answer
        assert!(checker.is_word_correct("автобус", Language::Russian).await);
        assert!(checker.is_word_correct("hello", Language::English).await);
    }

    #[tokio::test]
    async fn test_custom_fallback_words() {
        let store = Arc::new(MemoryPartitionStore::new());
        let checker = SpellChecker::builder(store)
            .sampler(Arc::new(ManualSampler::new(0)))
            .fallback_words(Language::English, ["Rustacean"])
            .build()
            .unwrap();
        assert!(checker.is_word_correct("rustacean", Language::English).await);
        assert!(checker.is_word_correct("program", Language::English).await);
    }

    #[tokio::test]
    async fn test_unknown_language_code() {
        let (_, checker) = make_checker();
        assert!(checker.is_word_correct_in("apple", "en").await);
        assert!(!checker.is_word_correct_in("apple", "xx").await);
    }

    #[tokio::test]
    async fn test_batch_loads_each_partition_once() {
        let (store, checker) = make_checker();
        let words = ["apple", "avocado", "Apple", "banana", "zzz", ""];
        let results = checker.validate_batch(&words, Language::English).await;
        assert_eq!(results, vec![true, false, true, true, false, false]);
        let a = PartitionKey::new(Language::English, 'a');
        assert_eq!(store.load_count(&a), 1);
        assert_eq!(checker.cache().stats().total_requests, 3);
    }

    #[tokio::test]
    async fn test_check_text_records_usage() {
        let (_, checker) = make_checker();
        let words = ["привет", "мир", "ошибка"];
        let report = checker
            .check_text(&words, Language::Russian, Some("привет мир ошибка"))
            .await;
        assert_eq!(report.correct, 2);
        assert_eq!(report.misspelled().collect::<Vec<_>>(), vec!["ошибка"]);
        // 17 characters does not exceed the preload threshold
        assert!(!report.preload_triggered);
        assert_eq!(checker.manager().optimization_stats().observations_recorded, 1);
    }

    #[tokio::test]
    async fn test_long_text_triggers_preload() {
        let (_, checker) = make_checker();
        let text = "привет мир, память и кэш, привет снова";
        let words = Language::Russian.tokenize(text);
        let report = checker.check_text(&words, Language::Russian, Some(text)).await;
        assert!(report.preload_triggered);
        assert_eq!(checker.preloader().stats().texts_analyzed, 1);
    }

    #[tokio::test]
    async fn test_dictionary_size_counts_resident_words() {
        let (_, checker) = make_checker();
        assert_eq!(checker.dictionary_size(Language::English), 0);
        checker.is_word_correct("apple", Language::English).await;
        checker.is_word_correct("cherry", Language::English).await;
        assert_eq!(checker.dictionary_size(Language::English), 2);
        assert_eq!(checker.dictionary_size(Language::Russian), 0);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let (_, checker) = make_checker();
        checker.is_word_correct("мир", Language::Russian).await;
        let report = checker.report();
        assert_eq!(report.cache.size, 1);
        assert!(report.metrics.contains_key("cache.hit_rate"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cached_partitions"][0], "ru_м");
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (_, checker) = make_checker();
        checker.start();
        assert!(checker.monitor().is_monitoring());
        checker.shutdown();
        assert!(!checker.monitor().is_monitoring());
        checker.shutdown();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SpellcheckConfig::default();
        config.cache.capacity = 0;
        let store = Arc::new(MemoryPartitionStore::new());
        assert!(SpellChecker::builder(store).config(config).build().is_err());
    }
}
