//! Basic Spell Checker Usage
//!
//! Writes a tiny dictionary directory, builds a [`SpellChecker`] over it and
//! shows single lookups, a batch with preloading and the combined report.
//!
//! Run with `cargo run --example basic_usage`.

use spellcache::{FilePartitionStore, Language, SpellChecker, SpellcheckConfig};
use std::fs;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("en_c.txt"), "cat\ncow\ncar\n")?;
    fs::write(dir.path().join("en_d.txt"), "dog\nday\n")?;
    fs::write(dir.path().join("en_s.txt"), "sun\nsat\nsit\n")?;

    let mut config = SpellcheckConfig::default();
    config.cache.capacity = 2;
    let checker = SpellChecker::builder(Arc::new(FilePartitionStore::new(dir.path())))
        .config(config)
        .build()?;

    println!("Single lookups");
    println!("==============");
    for word in ["cat", "dgo", "Dog"] {
        let correct = checker.is_word_correct(word, Language::English).await;
        println!("{word:>6}: {}", if correct { "ok" } else { "misspelled" });
    }

    let text = "the cat sat in the sun with a dog all day";
    let words = Language::English.tokenize(text);
    let report = checker
        .check_text(&words, Language::English, Some(text))
        .await;
    println!("\nBatch of {} words", report.results.len());
    println!("==================");
    println!("correct: {}, misspelled: {}", report.correct, report.incorrect);
    println!("preload triggered: {}", report.preload_triggered);
    for word in report.misspelled() {
        println!("  {word}");
    }

    let stats = checker.cache().stats();
    println!("\nCache");
    println!("=====");
    println!("resident: {} of {}", stats.size, stats.max_size);
    println!("hit rate: {:.2}%", stats.hit_rate * 100.0);
    println!("partitions: {:?}", checker.cache().cached_partitions());

    println!("\n{}", serde_json::to_string_pretty(&checker.report())?);
    Ok(())
}
