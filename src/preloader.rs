//! Predictive preloading of partitions.
//!
//! The [`IntelligentPreloader`] looks at incoming text, ranks the partitions
//! its words will need and warms the best ones in the background before the
//! checker asks for them. It only goes through the public cache API, so
//! preloads share in-flight loads with ordinary lookups and never count as
//! requests in the cache's hit rate.
//!
//! It also remembers which partitions texts have needed over time. That
//! history drives [`optimize_cache`](IntelligentPreloader::optimize_cache),
//! which sweeps idle partitions out and warms the most used ones.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::analyzer::{TextAnalysis, TextAnalyzer};
use crate::cache::{PartitionCache, PreloadOutcome};
use crate::config::{PreloadStrategy, PreloaderConfig};
use crate::language::{Language, PartitionKey};
use crate::metrics::ComponentMetrics;

/// Background loads started by one call.
#[derive(Debug)]
pub struct PreloadTask {
    keys: Vec<PartitionKey>,
    handle: Option<JoinHandle<()>>,
}

impl PreloadTask {
    fn idle() -> Self {
        Self {
            keys: Vec::new(),
            handle: None,
        }
    }

    /// Keys scheduled for loading, best first.
    pub fn keys(&self) -> &[PartitionKey] {
        &self.keys
    }

    /// Returns `true` once every scheduled load has settled.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for every scheduled load to settle.
    pub async fn wait(self) {
        if let Some(handle) = self.handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "preload task did not complete");
            }
        }
    }
}

/// Counters of the preloader.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreloadingStats {
    /// Texts that were analyzed.
    pub texts_analyzed: u64,
    /// Texts below the minimum length.
    pub texts_ignored: u64,
    /// Loads that reached the store.
    pub attempts: u64,
    /// Loads that produced a partition.
    pub successes: u64,
    /// Loads that failed.
    pub failures: u64,
    /// Candidates skipped because they were resident.
    pub skipped_resident: u64,
    /// Candidates skipped because their letter never starts a word.
    pub skipped_excluded: u64,
    /// Moving average of successful load time in milliseconds.
    pub average_load_ms: f64,
}

impl PreloadingStats {
    fn record_success(&mut self, elapsed: Duration) {
        self.attempts += 1;
        self.successes += 1;
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.average_load_ms += (ms - self.average_load_ms) / self.successes as f64;
    }
}

/// How often texts needed one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    /// Partition key.
    pub key: PartitionKey,
    /// Words across analyzed texts that needed the partition.
    pub count: u64,
    /// Time since a text last needed it.
    pub idle: Duration,
}

/// Snapshot returned by [`IntelligentPreloader::report`].
#[derive(Debug, Clone, Serialize)]
pub struct PreloaderReport {
    /// Counters.
    pub stats: PreloadingStats,
    /// Strategy in effect.
    pub strategy: PreloadStrategy,
    /// Most used partitions, most used first.
    pub top_used: Vec<UsageRecord>,
    /// Hit rate of the shared cache.
    pub cache_hit_rate: f64,
}

/// Result of [`IntelligentPreloader::optimize_cache`].
#[derive(Debug)]
pub struct CacheOptimization {
    /// Idle partitions removed by the sweep.
    pub evicted: Vec<PartitionKey>,
    /// Loads started for the most used partitions.
    pub warming: PreloadTask,
}

#[derive(Debug, Clone, Copy)]
struct LetterUsage {
    count: u64,
    last_used: Instant,
}

/// Warms partitions ahead of demand.
#[derive(Debug)]
pub struct IntelligentPreloader {
    config: PreloaderConfig,
    cache: Arc<PartitionCache>,
    analyzer: TextAnalyzer,
    strategy: Mutex<PreloadStrategy>,
    permits: Semaphore,
    usage: Mutex<HashMap<PartitionKey, LetterUsage>>,
    stats: Mutex<PreloadingStats>,
}

impl IntelligentPreloader {
    /// Creates a preloader working on `cache`.
    pub fn new(config: PreloaderConfig, cache: Arc<PartitionCache>) -> Self {
        Self {
            analyzer: TextAnalyzer::new(config.short_text_chars),
            strategy: Mutex::new(config.strategy),
            permits: Semaphore::new(config.max_concurrent_loads.max(1)),
            usage: Mutex::new(HashMap::new()),
            stats: Mutex::new(PreloadingStats::default()),
            cache,
            config,
        }
    }

    /// Analyzes `text` and starts background loads for the partitions it
    /// will need.
    ///
    /// Returns `None` for texts shorter than the configured minimum. Keys
    /// that are resident or excluded are skipped, and at most the strategy's
    /// number of loads start. Loads run on the current tokio runtime; without
    /// one nothing is scheduled.
    pub fn analyze_and_preload(self: &Arc<Self>, text: &str, language: Language) -> Option<PreloadTask> {
        let chars = text.trim().chars().count();
        if chars < self.config.min_text_chars {
            self.stats.lock().texts_ignored += 1;
            debug!(chars, min = self.config.min_text_chars, "text too short to preload for");
            return None;
        }

        let analysis = self.analyzer.analyze(text, language);
        self.record_usage(&analysis);
        self.stats.lock().texts_analyzed += 1;

        let limit = self.strategy().max_loads(self.config.max_loads_per_text);
        let keys = self.select(self.analyzer.predict(&analysis), limit);
        debug!(%language, words = analysis.word_count, scheduled = keys.len(), "text analyzed");
        Some(self.spawn_loads(keys))
    }

    /// Partitions `text` is likely to need: its own ranked initials, then
    /// up to three historically most used partitions of `language`.
    pub fn predict_partitions_for_text(&self, text: &str, language: Language) -> Vec<PartitionKey> {
        let analysis = self.analyzer.analyze(text, language);
        let mut keys = self.analyzer.predict(&analysis);
        let historical: Vec<PartitionKey> = self
            .top_used_keys(usize::MAX)
            .into_iter()
            .filter(|key| key.language == language && !keys.contains(key))
            .take(3)
            .collect();
        keys.extend(historical);
        keys
    }

    /// Sweeps idle partitions out of the cache and warms the most used ones.
    ///
    /// A resident partition is idle when it has fewer hits than the activity
    /// floor, is older than the grace period and is not among the most used
    /// keys. Least active partitions go first; the sweep stops at the
    /// configured minimum.
    pub fn optimize_cache(self: &Arc<Self>) -> CacheOptimization {
        let hot = self.top_used_keys(self.config.hot_keys);
        let min_age = self.config.sweep_min_age();

        let mut idle: Vec<_> = self
            .cache
            .entry_snapshots()
            .into_iter()
            .rev()
            .filter(|e| e.hits < self.config.activity_floor && e.age >= min_age && !hot.contains(&e.key))
            .collect();
        idle.sort_by_key(|e| e.hits);

        let mut evicted = Vec::new();
        for entry in idle {
            if self.cache.len() <= self.config.sweep_min_retained {
                break;
            }
            if self.cache.remove(&entry.key) {
                evicted.push(entry.key);
            }
        }

        let limit = self.strategy().max_loads(self.config.max_loads_per_text);
        let warming = self.spawn_loads(self.select(hot, limit));
        info!(
            evicted = evicted.len(),
            warming = warming.keys().len(),
            "preloader optimized cache"
        );
        CacheOptimization { evicted, warming }
    }

    /// The `n` partitions texts needed most, most used first.
    pub fn top_used_keys(&self, n: usize) -> Vec<PartitionKey> {
        self.usage_records().into_iter().take(n).map(|r| r.key).collect()
    }

    /// Usage history, most used first.
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        let usage = self.usage.lock();
        let mut records: Vec<UsageRecord> = usage
            .iter()
            .map(|(&key, u)| UsageRecord {
                key,
                count: u.count,
                idle: u.last_used.elapsed(),
            })
            .collect();
        records.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
        records
    }

    /// Drops usage records not refreshed within `max_age`. Returns how many
    /// were dropped.
    pub fn clear_old_stats(&self, max_age: Duration) -> usize {
        let mut usage = self.usage.lock();
        let before = usage.len();
        usage.retain(|_, u| u.last_used.elapsed() < max_age);
        let removed = before - usage.len();
        if removed > 0 {
            info!(removed, "cleared old usage records");
        }
        removed
    }

    /// [`clear_old_stats`](Self::clear_old_stats) with the configured age.
    pub fn clear_expired_stats(&self) -> usize {
        self.clear_old_stats(self.config.usage_max_age())
    }

    /// Changes how many loads one text may start.
    pub fn set_strategy(&self, strategy: PreloadStrategy) {
        let mut current = self.strategy.lock();
        if *current != strategy {
            info!(from = %*current, to = %strategy, "preload strategy changed");
            *current = strategy;
        }
    }

    /// Strategy in effect.
    pub fn strategy(&self) -> PreloadStrategy {
        *self.strategy.lock()
    }

    /// Counters.
    pub fn stats(&self) -> PreloadingStats {
        self.stats.lock().clone()
    }

    /// Counters, strategy and usage history.
    pub fn report(&self) -> PreloaderReport {
        let mut top_used = self.usage_records();
        top_used.truncate(self.config.hot_keys);
        PreloaderReport {
            stats: self.stats(),
            strategy: self.strategy(),
            top_used,
            cache_hit_rate: self.cache.stats().hit_rate,
        }
    }

    fn record_usage(&self, analysis: &TextAnalysis) {
        let now = Instant::now();
        let mut usage = self.usage.lock();
        for ranked in &analysis.ranked {
            let entry = usage.entry(ranked.key).or_insert(LetterUsage {
                count: 0,
                last_used: now,
            });
            entry.count += ranked.words as u64;
            entry.last_used = now;
        }
    }

    fn select(&self, candidates: Vec<PartitionKey>, limit: usize) -> Vec<PartitionKey> {
        let mut selected = Vec::new();
        let mut skipped_resident = 0;
        let mut skipped_excluded = 0;
        for key in candidates {
            if selected.len() >= limit {
                break;
            }
            if key.is_excluded() {
                skipped_excluded += 1;
            } else if self.cache.contains(&key) {
                skipped_resident += 1;
            } else if !selected.contains(&key) {
                selected.push(key);
            }
        }
        let mut stats = self.stats.lock();
        stats.skipped_resident += skipped_resident;
        stats.skipped_excluded += skipped_excluded;
        selected
    }

    fn spawn_loads(self: &Arc<Self>, keys: Vec<PartitionKey>) -> PreloadTask {
        if keys.is_empty() {
            return PreloadTask::idle();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(keys = keys.len(), "no tokio runtime, preload skipped");
            return PreloadTask::idle();
        };
        let preloader = Arc::clone(self);
        let batch = keys.clone();
        let handle = runtime.spawn(async move {
            let mut loads = JoinSet::new();
            for key in batch {
                let preloader = Arc::clone(&preloader);
                loads.spawn(async move { preloader.preload_one(key).await });
            }
            while loads.join_next().await.is_some() {}
        });
        PreloadTask {
            keys,
            handle: Some(handle),
        }
    }

    async fn preload_one(&self, key: PartitionKey) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        match self.cache.preload(key).await {
            PreloadOutcome::Loaded { words, elapsed } => {
                self.stats.lock().record_success(elapsed);
                debug!(partition = %key, words, elapsed_ms = elapsed.as_millis() as u64, "preloaded partition");
            }
            PreloadOutcome::AlreadyResident => self.stats.lock().skipped_resident += 1,
            PreloadOutcome::Excluded => self.stats.lock().skipped_excluded += 1,
            PreloadOutcome::Failed(err) => {
                {
                    let mut stats = self.stats.lock();
                    stats.attempts += 1;
                    stats.failures += 1;
                }
                warn!(error = %err, "preload failed");
            }
        }
    }
}

impl ComponentMetrics for IntelligentPreloader {
    fn metrics(&self) -> BTreeMap<String, f64> {
        let stats = self.stats();
        let mut metrics = BTreeMap::new();
        metrics.insert("texts_analyzed".to_string(), stats.texts_analyzed as f64);
        metrics.insert("texts_ignored".to_string(), stats.texts_ignored as f64);
        metrics.insert("attempts".to_string(), stats.attempts as f64);
        metrics.insert("successes".to_string(), stats.successes as f64);
        metrics.insert("failures".to_string(), stats.failures as f64);
        metrics.insert("skipped_resident".to_string(), stats.skipped_resident as f64);
        metrics.insert("skipped_excluded".to_string(), stats.skipped_excluded as f64);
        metrics.insert("average_load_ms".to_string(), stats.average_load_ms);
        metrics.insert("tracked_partitions".to_string(), self.usage.lock().len() as f64);
        metrics
    }

    fn component_name(&self) -> &'static str {
        "preloader"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionCacheConfig;
    use crate::store::MemoryPartitionStore;

    fn ru(letter: char) -> PartitionKey {
        PartitionKey::new(Language::Russian, letter)
    }

    fn make_preloader(
        config: PreloaderConfig,
    ) -> (Arc<MemoryPartitionStore>, Arc<PartitionCache>, Arc<IntelligentPreloader>) {
        let store = Arc::new(MemoryPartitionStore::new());
        store.insert_words(
            Language::Russian,
            ["банк", "бланк", "вода", "ветер", "абзац", "сад", "привет", "мир"],
        );
        let cache = Arc::new(PartitionCache::new(
            PartitionCacheConfig::default(),
            store.clone(),
        ));
        let preloader = Arc::new(IntelligentPreloader::new(config, cache.clone()));
        (store, cache, preloader)
    }

    fn long_text_config() -> PreloaderConfig {
        PreloaderConfig {
            short_text_chars: 0,
            ..PreloaderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_short_text_is_ignored() {
        let (store, _, preloader) = make_preloader(PreloaderConfig::default());
        assert!(preloader.analyze_and_preload("мир", Language::Russian).is_none());
        assert_eq!(preloader.stats().texts_ignored, 1);
        assert_eq!(store.total_loads(), 0);
    }

    #[tokio::test]
    async fn test_preloads_ranked_keys() {
        let (store, cache, preloader) = make_preloader(long_text_config());
        let task = preloader
            .analyze_and_preload("банк бланк вода ветер банк абзац", Language::Russian)
            .unwrap();
        assert_eq!(task.keys(), &[ru('б'), ru('в'), ru('а')]);
        task.wait().await;

        assert!(cache.contains(&ru('б')));
        assert!(cache.contains(&ru('в')));
        assert!(cache.contains(&ru('а')));
        assert_eq!(store.load_count(&ru('б')), 1);
        assert_eq!(cache.stats().total_requests, 0);
        let stats = preloader.stats();
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.attempts, 3);
    }

    #[tokio::test]
    async fn test_skips_resident_and_excluded() {
        let (store, cache, preloader) = make_preloader(long_text_config());
        cache.get_or_load(ru('б')).await;
        let task = preloader
            .analyze_and_preload("банк ыыы бланк ъъъ банк", Language::Russian)
            .unwrap();
        assert!(task.keys().is_empty());
        assert!(task.is_finished());
        task.wait().await;
        assert_eq!(store.load_count(&ru('б')), 1);
        assert_eq!(store.load_count(&ru('ы')), 0);
        let stats = preloader.stats();
        assert_eq!(stats.skipped_resident, 1);
        assert_eq!(stats.skipped_excluded, 2);
    }

    #[tokio::test]
    async fn test_strategy_caps_loads_per_text() {
        let config = PreloaderConfig {
            max_loads_per_text: 2,
            strategy: PreloadStrategy::Conservative,
            ..long_text_config()
        };
        let (_, _, preloader) = make_preloader(config);
        let task = preloader
            .analyze_and_preload("банк вода абзац сад привет мир", Language::Russian)
            .unwrap();
        assert_eq!(task.keys().len(), 1);
        task.wait().await;

        preloader.set_strategy(PreloadStrategy::Aggressive);
        assert_eq!(preloader.strategy(), PreloadStrategy::Aggressive);
        let task = preloader
            .analyze_and_preload("банк вода абзац сад привет мир", Language::Russian)
            .unwrap();
        assert_eq!(task.keys().len(), 4);
        task.wait().await;
    }

    #[tokio::test]
    async fn test_usage_history_and_prediction() {
        let (_, _, preloader) = make_preloader(long_text_config());
        preloader
            .analyze_and_preload("вода вода вода банк сад", Language::Russian)
            .unwrap()
            .wait()
            .await;
        assert_eq!(preloader.top_used_keys(2), vec![ru('в'), ru('б')]);

        let predicted = preloader.predict_partitions_for_text("мир", Language::Russian);
        assert_eq!(predicted, vec![ru('м'), ru('в'), ru('б'), ru('с')]);

        assert_eq!(preloader.clear_old_stats(Duration::from_secs(3600)), 0);
        assert_eq!(preloader.clear_old_stats(Duration::ZERO), 3);
        assert!(preloader.top_used_keys(8).is_empty());
    }

    #[tokio::test]
    async fn test_optimize_sweeps_idle_and_warms_hot() {
        let config = PreloaderConfig {
            sweep_min_age_secs: 0,
            sweep_min_retained: 1,
            hot_keys: 1,
            ..long_text_config()
        };
        let (_, cache, preloader) = make_preloader(config);
        // idle residents: never hit after insertion
        cache.get_or_load(ru('а')).await;
        cache.get_or_load(ru('с')).await;
        // an active resident
        cache.get_or_load(ru('м')).await;
        cache.get(&ru('м'));

        // usage history makes 'в' the hot key without loading it
        preloader.record_usage(&preloader.analyzer.analyze("вода ветер", Language::Russian));

        let outcome = preloader.optimize_cache();
        assert_eq!(outcome.evicted.len(), 2);
        assert!(cache.contains(&ru('м')));
        assert_eq!(outcome.warming.keys(), &[ru('в')]);
        outcome.warming.wait().await;
        assert!(cache.contains(&ru('в')));
    }
}
