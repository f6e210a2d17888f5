//! Simulation runner
//!
//! Sends generated batch requests through a [`SpellChecker`] the way a
//! service would: every batch carries its text, so preloading and usage
//! recording happen as in production. Every `optimize_every` batches the
//! runner forces a memory check and an adaptive optimization instead of
//! waiting for their timers.

use crate::generator::WorkloadGenerator;
use crate::models::{SimulationConfig, SimulationResult};
use crate::stats::SimulationStats;
use spellcache::SpellChecker;
use std::time::Instant;
use tracing::{debug, info};

/// Runner for workload simulations
#[derive(Debug)]
pub struct SimulationRunner<'a> {
    config: SimulationConfig,
    checker: &'a SpellChecker,
}

impl<'a> SimulationRunner<'a> {
    /// Create a runner sending requests to `checker`
    pub fn new(config: SimulationConfig, checker: &'a SpellChecker) -> Self {
        Self { config, checker }
    }

    /// Run the simulation to completion
    pub async fn run(&self, generator: &mut WorkloadGenerator) -> SimulationResult {
        let started = Instant::now();
        let mut stats = SimulationStats::new();

        info!(
            requests = self.config.requests,
            batch_size = self.config.batch_size,
            vocabulary = generator.vocabulary_len(),
            "simulation started"
        );

        for batch in 0..self.config.requests {
            let request = generator.next_request(self.config.language, self.config.batch_size);
            let report = self
                .checker
                .check_text(&request.words, request.language, Some(&request.text))
                .await;
            stats.record_batch(&report);

            if self.config.optimize_every > 0 && (batch + 1) % self.config.optimize_every == 0 {
                let check = self.checker.monitor().force_check();
                let optimization = self.checker.manager().force_optimization();
                debug!(
                    batch = batch + 1,
                    tier = %check.tier,
                    applied = optimization.applied,
                    capacity = optimization.after.capacity,
                    "periodic optimization"
                );
                stats.record_optimization(&optimization);
            }

            // let background preloads make progress between batches
            tokio::task::yield_now().await;
        }

        let result = stats.result(started.elapsed(), self.checker);
        info!(
            batches = stats.batches(),
            hit_rate = result.hit_rate,
            elapsed_ms = result.duration.as_millis() as u64,
            "simulation finished"
        );
        result
    }
}
