// Data models for workload simulation

use serde::Serialize;
use spellcache::Language;
use std::time::Duration;

/// One simulated batch request: the words to check and the text they came from
#[derive(Debug, Clone)]
pub struct Request {
    /// Language of the request
    pub language: Language,
    /// Words to validate, some of them misspelled
    pub words: Vec<String>,
    /// The words joined into a text, used to trigger preloading
    pub text: String,
}

/// Parameters of a simulation run
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Language of every request
    pub language: Language,
    /// Number of batch requests to send
    pub requests: usize,
    /// Words per batch
    pub batch_size: usize,
    /// Run a memory check and an optimization every N batches (0 disables)
    pub optimize_every: usize,
    /// Zipf exponent of word popularity; 0 is uniform
    pub skew: f64,
    /// Probability that a drawn word is misspelled
    pub misspell_rate: f64,
    /// Seed for reproducible workloads
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            language: Language::Russian,
            requests: 1_000,
            batch_size: 20,
            optimize_every: 100,
            skew: 1.0,
            misspell_rate: 0.1,
            seed: None,
        }
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// Batches sent
    pub batches: usize,
    /// Words checked
    pub words: usize,
    /// Words found in the dictionary
    pub correct: usize,
    /// Words not found
    pub incorrect: usize,
    /// Batches whose text started preloading
    pub preloads_triggered: usize,
    /// Optimization runs
    pub optimizations: usize,
    /// Optimization runs that changed the configuration
    pub optimizations_applied: usize,
    /// Cache hit rate at the end of the run
    pub hit_rate: f64,
    /// Cache capacity at the end of the run
    pub final_capacity: usize,
    /// Wall time of the run
    pub duration: Duration,
    /// Per-partition counters
    pub partitions: Vec<PartitionRow>,
}

/// One CSV row of per-partition statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionRow {
    /// Partition name, e.g. `ru_п`
    pub partition: String,
    /// Cache lookups for the partition
    pub requests: u64,
    /// Whether it is resident at the end of the run
    pub resident: bool,
    /// Words in the partition if resident
    pub words: usize,
    /// Hits since it was last inserted, if resident
    pub hits: u64,
}
