use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spellcache::{FilePartitionStore, Language, SpellChecker, SpellcheckConfig};
use spellcache_cli::generator::WorkloadGenerator;
use spellcache_cli::input;
use spellcache_cli::models::SimulationConfig;
use spellcache_cli::runner::SimulationRunner;
use spellcache_cli::stats;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Spell-check dictionary cache CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Directory of `<lang>_<letter>.txt` partition files
    #[arg(short, long, value_name = "DIR", default_value = "dictionaries", global = true)]
    dict: PathBuf,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Subcommands for the CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check single words
    Check {
        /// Words to check
        #[arg(required = true)]
        words: Vec<String>,

        /// Language code (ru, en)
        #[arg(short, long, default_value = "ru")]
        language: Language,
    },

    /// Check every word of a text file
    Batch {
        /// Text to check
        #[arg(long, value_name = "PATH")]
        text_file: PathBuf,

        /// Language code (ru, en)
        #[arg(short, long, default_value = "ru")]
        language: Language,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a synthetic workload and report how the cache adapted
    Simulate {
        /// Language code (ru, en)
        #[arg(short, long, default_value = "ru")]
        language: Language,

        /// Number of batch requests
        #[arg(long, default_value = "1000")]
        requests: usize,

        /// Words per batch
        #[arg(long, default_value = "20")]
        batch_size: usize,

        /// Force a memory check and an optimization every N batches (0 disables)
        #[arg(long, default_value = "100")]
        optimize_every: usize,

        /// Zipf exponent of word popularity (0 is uniform)
        #[arg(long, default_value = "1.0")]
        skew: f64,

        /// Probability that a word is misspelled
        #[arg(long, default_value = "0.1")]
        misspell_rate: f64,

        /// Seed for a reproducible workload
        #[arg(long)]
        seed: Option<u64>,

        /// Export per-partition statistics to a CSV file
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        /// Print the full JSON report after the summary
        #[arg(long)]
        report: bool,
    },

    /// Split a flat word list into partition files
    Split {
        /// Word list, one word per line
        #[arg(short, long, value_name = "PATH")]
        input: PathBuf,

        /// Language code (ru, en)
        #[arg(short, long, default_value = "ru")]
        language: Language,

        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = "dictionaries")]
        output: PathBuf,
    },

    /// Print the cache, monitor, preloader and manager report as JSON
    Stats {
        /// Check this text first so the report has something to show
        #[arg(long, value_name = "PATH")]
        text_file: Option<PathBuf>,

        /// Language of the text (ru, en)
        #[arg(short, long, default_value = "ru")]
        language: Language,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Check { ref words, language } => {
            let checker = build_checker(&args)?;
            for word in words {
                let correct = checker.is_word_correct(word, language).await;
                println!("{word}: {}", if correct { "ok" } else { "misspelled" });
            }
            Ok(())
        }

        Commands::Batch {
            ref text_file,
            language,
            json,
        } => {
            let checker = build_checker(&args)?;
            let text = fs::read_to_string(text_file)
                .with_context(|| format!("reading {}", text_file.display()))?;
            let words = language.tokenize(&text);
            let report = checker.check_text(&words, language, Some(&text)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} words, {} correct, {} misspelled ({:.2?})",
                    report.results.len(),
                    report.correct,
                    report.incorrect,
                    report.elapsed
                );
                for word in report.misspelled() {
                    println!("  {word}");
                }
            }
            Ok(())
        }

        Commands::Simulate {
            language,
            requests,
            batch_size,
            optimize_every,
            skew,
            misspell_rate,
            seed,
            ref csv,
            report,
        } => {
            let vocabulary = input::load_vocabulary(&args.dict, language)
                .with_context(|| format!("loading dictionaries from {}", args.dict.display()))?;
            if vocabulary.is_empty() {
                bail!(
                    "no {language} partitions in {}; create them with `split`",
                    args.dict.display()
                );
            }

            let checker = build_checker(&args)?;
            checker.start();

            let config = SimulationConfig {
                language,
                requests,
                batch_size,
                optimize_every,
                skew,
                misspell_rate,
                seed,
            };
            println!("Spellcheck Simulation");
            println!("=====================");
            println!("Dictionary: {}", args.dict.display());
            println!("Vocabulary: {} words", vocabulary.len());
            println!("Requests: {requests} x {batch_size} words");
            println!();

            let mut generator = WorkloadGenerator::new(vocabulary, skew, misspell_rate, seed);
            let result = SimulationRunner::new(config, &checker)
                .run(&mut generator)
                .await;
            checker.shutdown();

            stats::print_summary(&result);
            if let Some(path) = csv {
                stats::export_csv(&result.partitions, path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("\nPartition statistics exported to: {}", path.display());
            }
            if report {
                println!("{}", serde_json::to_string_pretty(&checker.report())?);
            }
            Ok(())
        }

        Commands::Split {
            ref input,
            language,
            ref output,
        } => {
            let words = input::read_word_list(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let summary = input::split_word_list(&words, language, output)
                .with_context(|| format!("writing partitions to {}", output.display()))?;
            info!(files = summary.files, words = summary.words, "word list split");
            println!(
                "Wrote {} words into {} partition files in {} ({} skipped)",
                summary.words,
                summary.files,
                output.display(),
                summary.skipped
            );
            Ok(())
        }

        Commands::Stats {
            ref text_file,
            language,
        } => {
            let checker = build_checker(&args)?;
            if let Some(path) = text_file {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let words = language.tokenize(&text);
                checker.check_text(&words, language, Some(&text)).await;
                checker.monitor().force_check();
            }
            println!("{}", serde_json::to_string_pretty(&checker.report())?);
            Ok(())
        }
    }
}

/// Build a checker over the dictionary directory, with the configured settings
fn build_checker(args: &Args) -> Result<SpellChecker> {
    let config = match &args.config {
        Some(path) => SpellcheckConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SpellcheckConfig::default(),
    };
    let store = Arc::new(FilePartitionStore::new(&args.dict));
    let checker = SpellChecker::builder(store).config(config).build()?;
    Ok(checker)
}
