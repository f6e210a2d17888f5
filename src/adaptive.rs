//! Adaptive tuning of capacity, thresholds and preload strategy.
//!
//! The [`AdaptiveMemoryManager`] owns the live configuration of the other
//! components. Each [`force_optimization`](AdaptiveMemoryManager::force_optimization)
//! looks at the *window* since the previous run (cache requests and hits,
//! monitor checks by tier, usage observations) and moves the configuration
//! one bounded step:
//!
//! | Window signal                                          | Response                        |
//! |--------------------------------------------------------|---------------------------------|
//! | share of checks at cleanup or above ≥ `pressure_ratio` | capacity − step, thresholds − step, conservative preloading |
//! | hit rate < floor for `low_hit_windows` windows, headroom left | capacity + step, aggressive preloading |
//! | hit rate ≥ ceiling, no pressure                        | thresholds + step               |
//!
//! Capacity stays within `[min_capacity, max_capacity]` and never below 1.
//! Thresholds stay within `[min_threshold_scale, max_threshold_scale]` of the
//! values the monitor started with and are always strictly increasing. A
//! run with no new usage observations changes nothing, so repeated calls
//! without traffic are idempotent.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::PartitionCache;
use crate::config::{AdaptiveConfig, MemoryThresholds, PreloadStrategy, ThresholdUpdate};
use crate::language::{Language, PartitionKey};
use crate::metrics::ComponentMetrics;
use crate::monitor::{MemoryMonitor, MemoryTier, MonitorStats};
use crate::preloader::IntelligentPreloader;

/// One checked text, as seen by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageObservation {
    /// Characters in the text.
    pub text_length: usize,
    /// Language of the text.
    pub language: Language,
    /// Words checked.
    pub word_count: usize,
    /// Initial letters of those words.
    pub letters: BTreeSet<char>,
    /// When it was recorded.
    pub recorded_at: Instant,
}

/// The configuration the manager controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ManagedConfig {
    /// Cache capacity in partitions.
    pub capacity: usize,
    /// Monitor thresholds.
    pub thresholds: MemoryThresholds,
    /// Preloader strategy.
    pub strategy: PreloadStrategy,
}

/// Which setting an [`Adjustment`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Cache capacity.
    CacheSize,
    /// Monitor thresholds.
    MemoryThresholds,
    /// Preloader strategy.
    PreloadStrategy,
}

/// A recorded configuration change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    /// Setting that changed.
    pub kind: AdjustmentKind,
    /// Previous value.
    pub old: String,
    /// New value.
    pub new: String,
    /// Why it changed.
    pub reason: String,
    /// When it changed.
    pub at: SystemTime,
}

/// Signals observed since the previous optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowSummary {
    /// Usage observations recorded.
    pub observations: u64,
    /// Cache lookups.
    pub requests: u64,
    /// Cache hits.
    pub hits: u64,
    /// Hit rate, if enough lookups were made to trust it.
    pub hit_rate: Option<f64>,
    /// Monitor checks.
    pub checks: u64,
    /// Checks at cleanup or above.
    pub pressure_checks: u64,
    /// Checks at critical.
    pub critical_checks: u64,
}

/// Result of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    /// Whether any setting changed.
    pub applied: bool,
    /// Configuration before the run.
    pub before: ManagedConfig,
    /// Configuration after the run.
    pub after: ManagedConfig,
    /// What the run saw and decided, in order.
    pub rationale: Vec<String>,
    /// Signals the decision was based on.
    pub window: WindowSummary,
}

/// Overall health grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthGrade {
    /// Score 90 or above.
    Excellent,
    /// Score 75 or above.
    Good,
    /// Score 60 or above.
    Fair,
    /// Score 40 or above.
    Poor,
    /// Below 40.
    Critical,
}

impl HealthGrade {
    /// Grade for a 0-100 score.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthGrade::Excellent
        } else if score >= 75.0 {
            HealthGrade::Good
        } else if score >= 60.0 {
            HealthGrade::Fair
        } else if score >= 40.0 {
            HealthGrade::Poor
        } else {
            HealthGrade::Critical
        }
    }
}

impl fmt::Display for HealthGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthGrade::Excellent => "excellent",
            HealthGrade::Good => "good",
            HealthGrade::Fair => "fair",
            HealthGrade::Poor => "poor",
            HealthGrade::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Health summary of the subsystem. Scores are 0-100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    /// Overall grade.
    pub overall: HealthGrade,
    /// Mean of the four component scores.
    pub score: f64,
    /// Tier of the latest memory check.
    pub tier: MemoryTier,
    /// Cache hit rate as a score.
    pub cache_efficiency: f64,
    /// Distance from the critical threshold as a score.
    pub memory_health: f64,
    /// Average preload time as a score.
    pub load_latency: f64,
    /// Fewer distinct recent adjustment kinds score higher.
    pub stability: f64,
    /// Mean text length over the usage history.
    pub average_text_length: f64,
    /// Languages seen in the usage history.
    pub distinct_languages: usize,
    /// Observations in the usage history.
    pub observations: usize,
    /// Suggested actions.
    pub recommendations: Vec<String>,
}

/// Counters and history of the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationStats {
    /// Optimization runs that looked at a non-empty window.
    pub total_optimizations: u64,
    /// Observations recorded since creation.
    pub observations_recorded: u64,
    /// Consecutive windows with a low hit rate.
    pub low_hit_streak: u32,
    /// Configuration in effect.
    pub managed: ManagedConfig,
    /// Recent adjustments, oldest first.
    pub adjustments: Vec<Adjustment>,
    /// Report of the latest run.
    pub last_report: Option<OptimizationReport>,
}

#[derive(Debug)]
struct ManagerState {
    history: VecDeque<UsageObservation>,
    observations_total: u64,
    observations_at_last_run: u64,
    cache_baseline: (u64, u64),
    monitor_baseline: MonitorStats,
    low_hit_streak: u32,
    managed: ManagedConfig,
    adjustments: VecDeque<Adjustment>,
    total_optimizations: u64,
    last_report: Option<OptimizationReport>,
}

#[derive(Debug)]
struct ScheduledTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Tunes cache capacity, memory thresholds and preload strategy from
/// observed usage.
#[derive(Debug)]
pub struct AdaptiveMemoryManager {
    config: AdaptiveConfig,
    base_thresholds: MemoryThresholds,
    cache: Arc<PartitionCache>,
    monitor: Arc<MemoryMonitor>,
    preloader: Arc<IntelligentPreloader>,
    state: Mutex<ManagerState>,
    task: Mutex<Option<ScheduledTask>>,
}

impl AdaptiveMemoryManager {
    /// Creates a manager. The monitor's current thresholds become the base
    /// that threshold scaling is relative to.
    pub fn new(
        config: AdaptiveConfig,
        cache: Arc<PartitionCache>,
        monitor: Arc<MemoryMonitor>,
        preloader: Arc<IntelligentPreloader>,
    ) -> Self {
        let base_thresholds = monitor.thresholds();
        let stats = cache.statistics();
        let state = ManagerState {
            history: VecDeque::with_capacity(config.history_window),
            observations_total: 0,
            observations_at_last_run: 0,
            cache_baseline: (stats.requests, stats.hits),
            monitor_baseline: monitor.stats(),
            low_hit_streak: 0,
            managed: ManagedConfig {
                capacity: cache.max_size(),
                thresholds: base_thresholds,
                strategy: preloader.strategy(),
            },
            adjustments: VecDeque::new(),
            total_optimizations: 0,
            last_report: None,
        };
        Self {
            config,
            base_thresholds,
            cache,
            monitor,
            preloader,
            state: Mutex::new(state),
            task: Mutex::new(None),
        }
    }

    /// Records one checked text. Has no side effect beyond the history.
    pub fn update_usage_data(&self, text_length: usize, language: Language, words: &[String]) {
        let letters = words
            .iter()
            .filter_map(|w| PartitionKey::for_word(w, language))
            .map(|key| key.letter)
            .collect();
        let observation = UsageObservation {
            text_length,
            language,
            word_count: words.len(),
            letters,
            recorded_at: Instant::now(),
        };
        let mut state = self.state.lock();
        state.history.push_back(observation);
        while state.history.len() > self.config.history_window {
            state.history.pop_front();
        }
        state.observations_total += 1;
    }

    /// Runs one optimization step now and returns what it decided.
    pub fn force_optimization(&self) -> OptimizationReport {
        let mut state = self.state.lock();
        let before = ManagedConfig {
            capacity: self.cache.max_size(),
            thresholds: self.monitor.thresholds(),
            strategy: self.preloader.strategy(),
        };
        state.managed = before;

        let new_observations = state.observations_total - state.observations_at_last_run;
        if new_observations == 0 {
            let report = OptimizationReport {
                applied: false,
                before,
                after: before,
                rationale: vec!["no usage observed since the previous optimization".to_string()],
                window: WindowSummary::default(),
            };
            debug!("optimization skipped, empty window");
            state.last_report = Some(report.clone());
            return report;
        }

        let window = self.window(&state, new_observations);
        let mut rationale = Vec::new();

        let pressure = window.checks > 0
            && window.pressure_checks as f64 / window.checks as f64 >= self.config.pressure_ratio;
        let headroom = self.has_headroom(&before.thresholds);
        let low_hit = window
            .hit_rate
            .is_some_and(|rate| rate < self.config.hit_rate_floor);

        // Capacity
        let mut capacity = before.capacity;
        if pressure {
            state.low_hit_streak = 0;
            capacity = capacity.saturating_sub(self.config.capacity_step);
            rationale.push(format!(
                "{} of {} memory checks reached cleanup or above",
                window.pressure_checks, window.checks
            ));
        } else if let Some(rate) = window.hit_rate {
            if low_hit {
                state.low_hit_streak += 1;
                rationale.push(format!(
                    "hit rate {:.2} below {:.2} ({} of {} windows)",
                    rate, self.config.hit_rate_floor, state.low_hit_streak, self.config.low_hit_windows
                ));
                if state.low_hit_streak >= self.config.low_hit_windows {
                    if headroom {
                        capacity = capacity.saturating_add(self.config.capacity_step);
                        state.low_hit_streak = 0;
                    } else {
                        rationale.push("no memory headroom to grow the cache".to_string());
                    }
                }
            } else {
                state.low_hit_streak = 0;
                rationale.push(format!("hit rate {rate:.2} is acceptable"));
            }
        } else {
            rationale.push(format!(
                "only {} cache requests, hit rate not trusted",
                window.requests
            ));
        }
        let capacity = capacity
            .max(self.config.min_capacity)
            .min(self.config.max_capacity)
            .max(1);

        // Thresholds
        let step = self.config.threshold_step;
        let current_steps = if step > 0.0 {
            ((before.thresholds.critical as f64 / self.base_thresholds.critical as f64 - 1.0) / step)
                .round()
        } else {
            0.0
        };
        let mut steps = current_steps;
        if window.critical_checks > 0 || pressure {
            steps -= 1.0;
        } else if window
            .hit_rate
            .is_some_and(|rate| rate >= self.config.hit_rate_ceiling)
            && window.pressure_checks == 0
        {
            steps += 1.0;
        }
        let scale = (1.0 + steps * step)
            .max(self.config.min_threshold_scale)
            .min(self.config.max_threshold_scale);
        let mut thresholds = if steps == current_steps {
            before.thresholds
        } else {
            self.base_thresholds.scaled(scale)
        };

        // Strategy
        let strategy = if pressure || self.monitor.current_tier() >= MemoryTier::Cleanup {
            PreloadStrategy::Conservative
        } else if low_hit && headroom {
            PreloadStrategy::Aggressive
        } else if window.hit_rate.is_some() {
            PreloadStrategy::Balanced
        } else {
            before.strategy
        };

        // Apply
        let mut adjustments = Vec::new();
        if capacity != before.capacity {
            let applied = self.cache.set_max_size(capacity);
            adjustments.push(self.adjustment(
                AdjustmentKind::CacheSize,
                before.capacity.to_string(),
                applied.to_string(),
                &rationale,
            ));
        }
        if thresholds != before.thresholds {
            match self.monitor.update_thresholds(ThresholdUpdate::from(thresholds)) {
                Ok(applied) => {
                    rationale.push(format!("thresholds scaled to {scale:.2} of base"));
                    adjustments.push(self.adjustment(
                        AdjustmentKind::MemoryThresholds,
                        describe_thresholds(&before.thresholds),
                        describe_thresholds(&applied),
                        &rationale,
                    ));
                    thresholds = applied;
                }
                Err(err) => {
                    warn!(error = %err, "threshold adjustment rejected");
                    rationale.push(format!("threshold adjustment rejected: {err}"));
                    thresholds = before.thresholds;
                }
            }
        }
        if strategy != before.strategy {
            self.preloader.set_strategy(strategy);
            rationale.push(format!("preloading set to {strategy}"));
            adjustments.push(self.adjustment(
                AdjustmentKind::PreloadStrategy,
                before.strategy.to_string(),
                strategy.to_string(),
                &rationale,
            ));
        }

        let after = ManagedConfig {
            capacity: self.cache.max_size(),
            thresholds,
            strategy,
        };
        let applied = !adjustments.is_empty();
        for adjustment in adjustments {
            state.adjustments.push_back(adjustment);
        }
        while state.adjustments.len() > self.config.adjustment_history {
            state.adjustments.pop_front();
        }

        let stats = self.cache.statistics();
        state.cache_baseline = (stats.requests, stats.hits);
        state.monitor_baseline = self.monitor.stats();
        state.observations_at_last_run = state.observations_total;
        state.total_optimizations += 1;
        state.managed = after;

        let report = OptimizationReport {
            applied,
            before,
            after,
            rationale,
            window,
        };
        if applied {
            info!(
                capacity = after.capacity,
                strategy = %after.strategy,
                critical = after.thresholds.critical,
                "adaptive optimization applied"
            );
        } else {
            debug!("adaptive optimization kept configuration");
        }
        state.last_report = Some(report.clone());
        report
    }

    /// Scores and grades the subsystem.
    pub fn system_health(&self) -> SystemHealth {
        let cache = self.cache.stats();
        let status = self.monitor.status();
        let preloads = self.preloader.stats();
        let state = self.state.lock();

        let cache_efficiency = if cache.total_requests == 0 {
            100.0
        } else {
            cache.hit_rate * 100.0
        };
        let memory_health = (100.0
            - status.current.used_bytes as f64 * 100.0 / status.thresholds.critical as f64)
            .clamp(0.0, 100.0);
        let load_latency = (100.0 - preloads.average_load_ms / 10.0).clamp(0.0, 100.0);
        let recent_kinds: BTreeSet<AdjustmentKind> =
            state.adjustments.iter().rev().take(10).map(|a| a.kind).collect();
        let stability = ((1.0 - 0.2 * recent_kinds.len() as f64) * 100.0).max(0.0);
        let score = (cache_efficiency + memory_health + load_latency + stability) / 4.0;

        let observations = state.history.len();
        let average_text_length = if observations == 0 {
            0.0
        } else {
            state.history.iter().map(|o| o.text_length).sum::<usize>() as f64 / observations as f64
        };
        let distinct_languages = state
            .history
            .iter()
            .map(|o| o.language)
            .collect::<BTreeSet<_>>()
            .len();

        let mut recommendations = Vec::new();
        if cache_efficiency < 70.0 {
            recommendations
                .push("cache hit rate is low: raise capacity or preload more aggressively".to_string());
        }
        if memory_health < 30.0 {
            recommendations.push(
                "memory usage is close to the critical threshold: lower capacity or raise thresholds"
                    .to_string(),
            );
        }
        if load_latency < 50.0 {
            recommendations.push("partition loads are slow: check the dictionary store".to_string());
        }
        if stability < 60.0 {
            recommendations
                .push("configuration changes often: widen the adaptive bounds".to_string());
        }
        if status.tier >= MemoryTier::Cleanup {
            recommendations.push(format!("memory tier is {}", status.tier));
        }

        SystemHealth {
            overall: HealthGrade::from_score(score),
            score,
            tier: status.tier,
            cache_efficiency,
            memory_health,
            load_latency,
            stability,
            average_text_length,
            distinct_languages,
            observations,
            recommendations,
        }
    }

    /// Counters, configuration and adjustment history.
    pub fn optimization_stats(&self) -> OptimizationStats {
        let state = self.state.lock();
        OptimizationStats {
            total_optimizations: state.total_optimizations,
            observations_recorded: state.observations_total,
            low_hit_streak: state.low_hit_streak,
            managed: state.managed,
            adjustments: state.adjustments.iter().cloned().collect(),
            last_report: state.last_report.clone(),
        }
    }

    /// Runs [`force_optimization`](Self::force_optimization) periodically on
    /// the current tokio runtime whenever health is below excellent. The
    /// first run happens one interval after start.
    pub fn start_automatic_optimization(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, automatic optimization not started");
            return false;
        };
        let (shutdown, mut stop) = watch::channel(false);
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.config.optimization_interval();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.preloader.clear_expired_stats();
                        let health = manager.system_health();
                        if health.overall != HealthGrade::Excellent {
                            manager.force_optimization();
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        *task = Some(ScheduledTask { handle, shutdown });
        info!(interval_secs = period.as_secs(), "automatic optimization started");
        true
    }

    /// Stops the periodic loop. Returns `false` if it was not running.
    pub fn stop_automatic_optimization(&self) -> bool {
        let Some(task) = self.task.lock().take() else {
            return false;
        };
        let _ = task.shutdown.send(true);
        task.handle.abort();
        info!("automatic optimization stopped");
        true
    }

    fn window(&self, state: &ManagerState, observations: u64) -> WindowSummary {
        let stats = self.cache.statistics();
        let requests = stats.requests.saturating_sub(state.cache_baseline.0);
        let hits = stats.hits.saturating_sub(state.cache_baseline.1);
        let monitor = self.monitor.stats();
        let baseline = &state.monitor_baseline;
        WindowSummary {
            observations,
            requests,
            hits,
            hit_rate: (requests >= self.config.min_window_requests.max(1))
                .then(|| hits as f64 / requests as f64),
            checks: monitor.checks.saturating_sub(baseline.checks),
            pressure_checks: monitor
                .pressure_checks()
                .saturating_sub(baseline.pressure_checks()),
            critical_checks: monitor
                .critical_checks
                .saturating_sub(baseline.critical_checks),
        }
    }

    fn has_headroom(&self, thresholds: &MemoryThresholds) -> bool {
        match self.monitor.last_check() {
            Some(check) => {
                (check.sample.used_bytes as f64)
                    < thresholds.critical as f64 * self.config.headroom_ratio
            }
            None => true,
        }
    }

    fn adjustment(
        &self,
        kind: AdjustmentKind,
        old: String,
        new: String,
        rationale: &[String],
    ) -> Adjustment {
        Adjustment {
            kind,
            old,
            new,
            reason: rationale.join("; "),
            at: SystemTime::now(),
        }
    }
}

fn describe_thresholds(t: &MemoryThresholds) -> String {
    format!("{}/{}/{}", t.warning, t.cleanup, t.critical)
}

impl ComponentMetrics for AdaptiveMemoryManager {
    fn metrics(&self) -> BTreeMap<String, f64> {
        let state = self.state.lock();
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "total_optimizations".to_string(),
            state.total_optimizations as f64,
        );
        metrics.insert("observations".to_string(), state.history.len() as f64);
        metrics.insert("adjustments".to_string(), state.adjustments.len() as f64);
        metrics.insert("low_hit_streak".to_string(), f64::from(state.low_hit_streak));
        metrics.insert("capacity".to_string(), state.managed.capacity as f64);
        metrics
    }

    fn component_name(&self) -> &'static str {
        "adaptive"
    }
}
