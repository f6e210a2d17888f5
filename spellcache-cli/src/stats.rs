// Statistics collection and reporting for workload simulation

use crate::models::{PartitionRow, SimulationResult};
use spellcache::checker::BatchReport;
use spellcache::{OptimizationReport, SpellChecker};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Accumulates counters while a simulation runs
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    batches: usize,
    words: usize,
    correct: usize,
    incorrect: usize,
    preloads_triggered: usize,
    optimizations: usize,
    optimizations_applied: usize,
}

impl SimulationStats {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one checked batch
    pub fn record_batch(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.words += report.results.len();
        self.correct += report.correct;
        self.incorrect += report.incorrect;
        if report.preload_triggered {
            self.preloads_triggered += 1;
        }
    }

    /// Record one optimization run
    pub fn record_optimization(&mut self, report: &OptimizationReport) {
        self.optimizations += 1;
        if report.applied {
            self.optimizations_applied += 1;
        }
    }

    /// Batches recorded so far
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Finish the run, reading the final cache state from `checker`
    pub fn result(&self, duration: Duration, checker: &SpellChecker) -> SimulationResult {
        let cache = checker.cache();
        let stats = cache.stats();
        SimulationResult {
            batches: self.batches,
            words: self.words,
            correct: self.correct,
            incorrect: self.incorrect,
            preloads_triggered: self.preloads_triggered,
            optimizations: self.optimizations,
            optimizations_applied: self.optimizations_applied,
            hit_rate: stats.hit_rate,
            final_capacity: stats.max_size,
            duration,
            partitions: partition_rows(checker),
        }
    }
}

/// Per-partition rows: every partition looked up at least once, plus every
/// resident one, ordered by partition name
pub fn partition_rows(checker: &SpellChecker) -> Vec<PartitionRow> {
    let cache = checker.cache();
    let mut rows: BTreeMap<String, PartitionRow> = BTreeMap::new();
    for (key, requests) in cache.statistics().per_key_requests {
        rows.insert(
            key.to_string(),
            PartitionRow {
                partition: key.to_string(),
                requests,
                resident: false,
                words: 0,
                hits: 0,
            },
        );
    }
    for entry in cache.entry_snapshots() {
        let row = rows.entry(entry.key.to_string()).or_insert(PartitionRow {
            partition: entry.key.to_string(),
            requests: 0,
            resident: false,
            words: 0,
            hits: 0,
        });
        row.resident = true;
        row.words = entry.words;
        row.hits = entry.hits;
    }
    rows.into_values().collect()
}

/// Print a summary report of the simulation results
pub fn print_summary(result: &SimulationResult) {
    println!("\nSpellcheck Simulation Summary");
    println!("=============================");
    println!("Batches: {}", result.batches);
    println!("Words checked: {}", result.words);
    println!(
        "Correct / incorrect: {} / {}",
        result.correct, result.incorrect
    );
    println!("Preloads triggered: {}", result.preloads_triggered);
    println!(
        "Optimizations: {} ({} changed the configuration)",
        result.optimizations, result.optimizations_applied
    );
    println!("Cache hit rate: {:.2}%", result.hit_rate * 100.0);
    println!("Final capacity: {} partitions", result.final_capacity);
    println!("Completed in {:.2?}", result.duration);

    let mut busiest: Vec<&PartitionRow> = result.partitions.iter().collect();
    busiest.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.partition.cmp(&b.partition)));

    println!("\nBusiest partitions:");
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>8}",
        "Partition", "Requests", "Words", "Hits", "Resident"
    );
    println!("{}", "-".repeat(52));
    for row in busiest.into_iter().take(10) {
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>8}",
            row.partition,
            row.requests,
            row.words,
            row.hits,
            if row.resident { "yes" } else { "no" }
        );
    }
}

/// Export per-partition rows to a CSV file
pub fn export_csv(rows: &[PartitionRow], path: &Path) -> Result<(), std::io::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
