#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Component Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            SpellChecker                              │
//! │   is_word_correct / validate_batch / check_text / report             │
//! └──────┬──────────────────────┬───────────────────────┬────────────────┘
//!        │ get_or_load          │ analyze_and_preload   │ update_usage_data
//!        ▼                      ▼                       ▼
//! ┌──────────────┐  preload  ┌───────────────────┐  ┌───────────────────────┐
//! │PartitionCache│◀──────────│IntelligentPreloader│◀─│ AdaptiveMemoryManager │
//! │  (LRU, Arc)  │           └───────────────────┘  │ capacity, thresholds, │
//! └──┬────────▲──┘                                   │ preload strategy      │
//!    │        │ evict_lru    ┌───────────────────┐  └──────────┬────────────┘
//!    │        └──────────────│   MemoryMonitor    │◀────────────┘
//!    │ load_partition        │ Normal→…→Critical  │ update_thresholds
//!    ▼                       └───────────────────┘
//! ┌──────────────┐
//! │PartitionStore│  FilePartitionStore / MemoryPartitionStore
//! └──────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Role |
//! |------|------|
//! | [`PartitionCache`] | Bounded LRU of word lists with single-flight loading |
//! | [`MemoryMonitor`] | Samples memory and evicts partitions under pressure |
//! | [`IntelligentPreloader`] | Warms partitions a text is likely to need |
//! | [`AdaptiveMemoryManager`] | Retunes capacity, thresholds and preloading |
//! | [`SpellChecker`] | Word and batch validation over all of the above |
//!
//! ## Checking words
//!
//! ```rust
//! use std::sync::Arc;
//! use spellcache::{Language, MemoryPartitionStore, SpellChecker};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(MemoryPartitionStore::new());
//! store.insert_words(Language::Russian, ["привет", "память"]);
//! let checker = SpellChecker::builder(store).build().unwrap();
//!
//! let words = ["Привет", "памать"];
//! let verdicts = checker.validate_batch(&words, Language::Russian).await;
//! assert_eq!(verdicts, vec![true, false]);
//! # });
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: The partition cache
//! - [`monitor`]: Memory sampling and pressure response
//! - [`preloader`]: Predictive preloading
//! - [`analyzer`]: Text analysis used by the preloader
//! - [`adaptive`]: Adaptive tuning and health grading
//! - [`checker`]: The validation facade
//! - [`store`]: Partition stores
//! - [`config`]: Configuration structures
//! - [`metrics`]: Counters and the metrics trait

#[cfg(test)]
extern crate scoped_threadpool;

/// Errors of every component.
pub mod error;

/// Languages, partition keys and word normalization.
pub mod language;

/// Loaded word lists.
pub mod partition;

/// Resident cache entries and their read-only snapshots.
pub mod entry;

/// Doubly linked list implementation with in-place editing capabilities.
///
/// **Note**: This module is internal infrastructure. It exposes unsafe raw
/// pointer operations that require careful invariant maintenance.
pub(crate) mod list;

/// Recency-ordered map of partitions backing the cache.
pub(crate) mod lru;

/// Configuration structures.
pub mod config;

/// Cache metrics system.
pub mod metrics;

/// Partition stores.
pub mod store;

/// The partition cache.
pub mod cache;

/// Memory monitoring.
pub mod monitor;

/// Text analysis.
pub mod analyzer;

/// Predictive preloading.
pub mod preloader;

/// Adaptive tuning.
pub mod adaptive;

/// The validation facade.
pub mod checker;

pub use adaptive::{
    AdaptiveMemoryManager, Adjustment, AdjustmentKind, HealthGrade, ManagedConfig,
    OptimizationReport, OptimizationStats, SystemHealth,
};
pub use analyzer::{TextAnalysis, TextAnalyzer};
pub use cache::{CacheStats, PartitionCache, PreloadOutcome};
pub use checker::{BatchReport, SpellChecker, SpellCheckerBuilder, SpellcheckReport};
pub use config::SpellcheckConfig;
pub use entry::{CacheEntry, EntrySnapshot};
pub use error::{CacheError, ConfigError, LanguageError, StoreError};
pub use language::{Language, PartitionKey};
pub use metrics::{CacheStatistics, ComponentMetrics};
pub use monitor::{
    ManualSampler, MemoryMonitor, MemorySample, MemorySampler, MemoryTier, ProcessMemorySampler,
};
pub use partition::{DictionaryPartition, WordSet};
pub use preloader::{IntelligentPreloader, PreloadTask, PreloadingStats};
pub use store::{FilePartitionStore, MemoryPartitionStore, PartitionStore};
