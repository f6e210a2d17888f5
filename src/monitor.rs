//! Memory pressure monitor.
//!
//! [`MemoryMonitor`] samples the process footprint on a fixed period,
//! classifies it into a [`MemoryTier`] and makes the cache give memory back:
//!
//! - **Normal**: nothing.
//! - **Warning**: a log line.
//! - **Cleanup**: evict least recently used partitions until the estimated
//!   usage falls below the cleanup threshold or only `min_retained` remain.
//! - **Critical**: evict down to `critical_retained` partitions at once.
//!
//! Eviction never changes the cache capacity; the adaptive manager owns it.
//! After each eviction the estimate is lowered by the partition's
//! footprint, so one pass does not need a fresh sample per partition.
//!
//! Sampling goes through the [`MemorySampler`] trait. The default
//! [`ProcessMemorySampler`] reads the resident set size via `sysinfo`;
//! tests use [`ManualSampler`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::PartitionCache;
use crate::config::{MemoryMonitorConfig, MemoryThresholds, ThresholdUpdate};
use crate::error::CacheError;
use crate::metrics::ComponentMetrics;

/// Pressure level of one memory sample, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Below the warning threshold.
    #[default]
    Normal,
    /// At or above the warning threshold.
    Warning,
    /// At or above the cleanup threshold.
    Cleanup,
    /// At or above the critical threshold.
    Critical,
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryTier::Normal => "normal",
            MemoryTier::Warning => "warning",
            MemoryTier::Cleanup => "cleanup",
            MemoryTier::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// One reading of memory usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    /// Bytes used by the process.
    pub used_bytes: u64,
    /// Bytes of memory on the machine, 0 if unknown.
    pub total_bytes: u64,
    /// When the sample was taken.
    pub taken_at: SystemTime,
}

impl MemorySample {
    /// Sample taken now.
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        Self {
            used_bytes,
            total_bytes,
            taken_at: SystemTime::now(),
        }
    }

    /// Used memory in MiB.
    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Used share of total memory in percent, 0.0 if the total is unknown.
    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 * 100.0 / self.total_bytes as f64
        }
    }
}

/// Source of memory samples.
pub trait MemorySampler: Send + Sync + fmt::Debug {
    /// Takes one sample.
    fn sample(&self) -> MemorySample;
}

/// Samples the current process through `sysinfo`.
///
/// Falls back to machine-wide used memory if the process cannot be read.
pub struct ProcessMemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemorySampler {
    /// Sampler for the running process.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessMemorySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessMemorySampler")
            .field("pid", &self.pid)
            .finish()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample(&self) -> MemorySample {
        let mut system = self.system.lock();
        system.refresh_memory();
        let process_bytes = self.pid.and_then(|pid| {
            system.refresh_process(pid);
            system.process(pid).map(|process| process.memory())
        });
        let used = process_bytes.unwrap_or_else(|| system.used_memory());
        MemorySample::new(used, system.total_memory())
    }
}

/// Sampler that reports whatever it was last told.
#[derive(Debug, Default)]
pub struct ManualSampler {
    used: AtomicU64,
    total: AtomicU64,
}

impl ManualSampler {
    /// Sampler reporting `used_bytes`, with an unknown total.
    pub fn new(used_bytes: u64) -> Self {
        Self {
            used: AtomicU64::new(used_bytes),
            total: AtomicU64::new(0),
        }
    }

    /// Changes the reported usage.
    pub fn set_used(&self, used_bytes: u64) {
        self.used.store(used_bytes, Ordering::Relaxed);
    }

    /// Changes the reported total.
    pub fn set_total(&self, total_bytes: u64) {
        self.total.store(total_bytes, Ordering::Relaxed);
    }
}

impl MemorySampler for ManualSampler {
    fn sample(&self) -> MemorySample {
        MemorySample::new(
            self.used.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    /// Tier of the sample.
    pub tier: MemoryTier,
    /// The sample the decision was based on.
    pub sample: MemorySample,
    /// Partitions evicted by this check.
    pub evicted: usize,
    /// Usage estimate after evictions.
    pub estimated_used_bytes: u64,
}

/// Counters since the monitor was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Checks run.
    pub checks: u64,
    /// Checks that landed in the warning tier.
    pub warning_checks: u64,
    /// Checks that landed in the cleanup tier.
    pub cleanup_checks: u64,
    /// Checks that landed in the critical tier.
    pub critical_checks: u64,
    /// Partitions evicted in response to pressure.
    pub partitions_evicted: u64,
    /// Estimated bytes released by those evictions.
    pub bytes_released: u64,
}

impl MonitorStats {
    /// Checks at cleanup or above.
    pub fn pressure_checks(&self) -> u64 {
        self.cleanup_checks + self.critical_checks
    }
}

/// Snapshot returned by [`MemoryMonitor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    /// Tier of the most recent check.
    pub tier: MemoryTier,
    /// A sample taken for this status.
    pub current: MemorySample,
    /// Thresholds in effect.
    pub thresholds: MemoryThresholds,
    /// Whether the background loop runs.
    pub is_monitoring: bool,
    /// Background check period.
    pub check_interval: Duration,
    /// Outcome of the most recent check.
    pub last_check: Option<CheckOutcome>,
    /// Counters.
    pub stats: MonitorStats,
}

#[derive(Debug)]
struct MonitorState {
    thresholds: MemoryThresholds,
    tier: MemoryTier,
    last_check: Option<CheckOutcome>,
    stats: MonitorStats,
}

#[derive(Debug)]
struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Periodically samples memory and sheds cache partitions under pressure.
#[derive(Debug)]
pub struct MemoryMonitor {
    config: MemoryMonitorConfig,
    cache: Arc<PartitionCache>,
    sampler: Arc<dyn MemorySampler>,
    state: Mutex<MonitorState>,
    task: Mutex<Option<MonitorTask>>,
}

impl MemoryMonitor {
    /// Creates a stopped monitor.
    pub fn new(
        config: MemoryMonitorConfig,
        cache: Arc<PartitionCache>,
        sampler: Arc<dyn MemorySampler>,
    ) -> Self {
        let state = MonitorState {
            thresholds: config.thresholds,
            tier: MemoryTier::Normal,
            last_check: None,
            stats: MonitorStats::default(),
        };
        Self {
            config,
            cache,
            sampler,
            state: Mutex::new(state),
            task: Mutex::new(None),
        }
    }

    /// Starts the background check loop on the current tokio runtime.
    ///
    /// The first check runs immediately. Returns `false` if the loop is
    /// already running or no runtime is available.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("memory monitoring already running");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, memory monitoring not started");
            return false;
        };

        let (shutdown, mut stop) = watch::channel(false);
        let monitor: Weak<Self> = Arc::downgrade(self);
        let period = self.config.check_interval();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(monitor) = monitor.upgrade() else { break };
                        monitor.force_check();
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("memory monitor loop exited");
        });

        *task = Some(MonitorTask { handle, shutdown });
        info!(interval_secs = period.as_secs(), "memory monitoring started");
        true
    }

    /// Stops the background loop. Returns `false` if it was not running.
    pub fn stop_monitoring(&self) -> bool {
        let Some(task) = self.task.lock().take() else {
            return false;
        };
        let _ = task.shutdown.send(true);
        task.handle.abort();
        info!("memory monitoring stopped");
        true
    }

    /// Returns `true` while the background loop runs.
    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Samples memory now and applies the response for its tier.
    pub fn force_check(&self) -> CheckOutcome {
        let sample = self.sampler.sample();
        let thresholds = self.state.lock().thresholds;
        let tier = thresholds.tier_for(sample.used_bytes);

        let mut estimated = sample.used_bytes;
        let mut evicted = 0usize;
        let mut released = 0u64;
        let mut shed = |keep: usize, stop_below: Option<u64>| {
            while self.cache.len() > keep && stop_below.map_or(true, |limit| estimated >= limit) {
                let Some(partition) = self.cache.evict_lru() else {
                    break;
                };
                estimated = estimated.saturating_sub(partition.footprint_bytes());
                released += partition.footprint_bytes();
                evicted += 1;
            }
        };

        match tier {
            MemoryTier::Normal => {}
            MemoryTier::Warning => {
                warn!(used_mb = sample.used_mb(), "memory usage above warning threshold");
            }
            MemoryTier::Cleanup => {
                shed(self.config.min_retained, Some(thresholds.cleanup));
            }
            MemoryTier::Critical => {
                shed(self.config.critical_retained, None);
            }
        }

        let outcome = CheckOutcome {
            tier,
            sample,
            evicted,
            estimated_used_bytes: estimated,
        };

        let previous = {
            let mut state = self.state.lock();
            let previous = state.tier;
            state.tier = tier;
            state.last_check = Some(outcome.clone());
            let stats = &mut state.stats;
            stats.checks += 1;
            match tier {
                MemoryTier::Normal => {}
                MemoryTier::Warning => stats.warning_checks += 1,
                MemoryTier::Cleanup => stats.cleanup_checks += 1,
                MemoryTier::Critical => stats.critical_checks += 1,
            }
            stats.partitions_evicted += evicted as u64;
            stats.bytes_released += released;
            previous
        };

        match tier {
            MemoryTier::Critical => error!(
                used_mb = sample.used_mb(),
                evicted,
                remaining = self.cache.len(),
                "critical memory usage, cache cut to minimum"
            ),
            MemoryTier::Cleanup => info!(
                used_mb = sample.used_mb(),
                evicted,
                remaining = self.cache.len(),
                "memory cleanup evicted partitions"
            ),
            _ => debug!(used_mb = sample.used_mb(), %tier, "memory check"),
        }
        if previous != tier {
            info!(from = %previous, to = %tier, "memory tier changed");
        }
        outcome
    }

    /// Merges `update` into the thresholds.
    ///
    /// Fails and keeps the old thresholds if the result is not strictly
    /// increasing.
    pub fn update_thresholds(&self, update: ThresholdUpdate) -> Result<MemoryThresholds, CacheError> {
        let mut state = self.state.lock();
        let merged = state.thresholds.merged(&update);
        merged.validate()?;
        state.thresholds = merged;
        info!(
            warning = merged.warning,
            cleanup = merged.cleanup,
            critical = merged.critical,
            "memory thresholds updated"
        );
        Ok(merged)
    }

    /// Thresholds in effect.
    pub fn thresholds(&self) -> MemoryThresholds {
        self.state.lock().thresholds
    }

    /// Tier of the most recent check.
    pub fn current_tier(&self) -> MemoryTier {
        self.state.lock().tier
    }

    /// Outcome of the most recent check.
    pub fn last_check(&self) -> Option<CheckOutcome> {
        self.state.lock().last_check.clone()
    }

    /// Counters.
    pub fn stats(&self) -> MonitorStats {
        self.state.lock().stats
    }

    /// Current tier, a fresh sample and the thresholds.
    pub fn status(&self) -> MonitorStatus {
        let current = self.sampler.sample();
        let is_monitoring = self.is_monitoring();
        let state = self.state.lock();
        MonitorStatus {
            tier: state.tier,
            current,
            thresholds: state.thresholds,
            is_monitoring,
            check_interval: self.config.check_interval(),
            last_check: state.last_check.clone(),
            stats: state.stats,
        }
    }
}

impl ComponentMetrics for MemoryMonitor {
    fn metrics(&self) -> BTreeMap<String, f64> {
        let state = self.state.lock();
        let mut metrics = BTreeMap::new();
        metrics.insert("checks".to_string(), state.stats.checks as f64);
        metrics.insert("warning_checks".to_string(), state.stats.warning_checks as f64);
        metrics.insert("cleanup_checks".to_string(), state.stats.cleanup_checks as f64);
        metrics.insert("critical_checks".to_string(), state.stats.critical_checks as f64);
        metrics.insert(
            "partitions_evicted".to_string(),
            state.stats.partitions_evicted as f64,
        );
        metrics.insert("bytes_released".to_string(), state.stats.bytes_released as f64);
        metrics.insert("tier".to_string(), state.tier as u8 as f64);
        if let Some(check) = &state.last_check {
            metrics.insert("used_bytes".to_string(), check.sample.used_bytes as f64);
        }
        metrics
    }

    fn component_name(&self) -> &'static str {
        "monitor"
    }
}
