//! Configuration for the adaptive memory manager.
//!
//! The manager compares the hit rate and memory pressure seen since its
//! previous run against the bounds below, then moves capacity by
//! `capacity_step` and the thresholds by `threshold_step` of their base
//! values.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for an [`AdaptiveMemoryManager`](crate::AdaptiveMemoryManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Smallest capacity the manager will set.
    pub min_capacity: usize,
    /// Largest capacity the manager will set.
    pub max_capacity: usize,
    /// Partitions added or removed per adjustment.
    pub capacity_step: usize,
    /// Hit rate below which a window counts as poor.
    pub hit_rate_floor: f64,
    /// Hit rate above which thresholds may be relaxed.
    pub hit_rate_ceiling: f64,
    /// Consecutive poor windows needed before capacity grows.
    pub low_hit_windows: u32,
    /// Requests a window needs before its hit rate is trusted.
    pub min_window_requests: u64,
    /// Share of checks at cleanup or above that counts as frequent pressure.
    pub pressure_ratio: f64,
    /// Capacity only grows while usage stays below this share of the critical threshold.
    pub headroom_ratio: f64,
    /// Threshold scale change per adjustment.
    pub threshold_step: f64,
    /// Lowest allowed threshold scale.
    pub min_threshold_scale: f64,
    /// Highest allowed threshold scale.
    pub max_threshold_scale: f64,
    /// Usage observations kept.
    pub history_window: usize,
    /// Adjustments kept.
    pub adjustment_history: usize,
    /// Period of the automatic optimization loop in seconds.
    pub optimization_interval_secs: u64,
}

impl AdaptiveConfig {
    /// Automatic optimization period as a [`Duration`].
    pub fn optimization_interval(&self) -> Duration {
        Duration::from_secs(self.optimization_interval_secs)
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_capacity == 0 || self.min_capacity > self.max_capacity {
            return Err(ConfigError::Invalid(format!(
                "adaptive capacity bounds [{}, {}] are invalid",
                self.min_capacity, self.max_capacity
            )));
        }
        for (name, value) in [
            ("hit_rate_floor", self.hit_rate_floor),
            ("hit_rate_ceiling", self.hit_rate_ceiling),
            ("pressure_ratio", self.pressure_ratio),
            ("headroom_ratio", self.headroom_ratio),
            ("threshold_step", self.threshold_step),
            ("min_threshold_scale", self.min_threshold_scale),
            ("max_threshold_scale", self.max_threshold_scale),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "adaptive.{name} must be a finite, non-negative number, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.hit_rate_floor)
            || !(self.hit_rate_floor..=1.0).contains(&self.hit_rate_ceiling)
        {
            return Err(ConfigError::Invalid(
                "adaptive hit rate bounds must satisfy 0 <= floor <= ceiling <= 1".to_string(),
            ));
        }
        if self.min_threshold_scale <= 0.0 || self.min_threshold_scale > self.max_threshold_scale
        {
            return Err(ConfigError::Invalid(
                "adaptive threshold scale bounds are invalid".to_string(),
            ));
        }
        if self.optimization_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "adaptive.optimization_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_capacity: 4,
            max_capacity: 16,
            capacity_step: 2,
            hit_rate_floor: 0.8,
            hit_rate_ceiling: 0.95,
            low_hit_windows: 2,
            min_window_requests: 20,
            pressure_ratio: 0.25,
            headroom_ratio: 0.8,
            threshold_step: 0.1,
            min_threshold_scale: 0.5,
            max_threshold_scale: 1.5,
            history_window: 168,
            adjustment_history: 50,
            optimization_interval_secs: 2 * 60 * 60,
        }
    }
}
