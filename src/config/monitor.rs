//! Configuration for the memory monitor.
//!
//! Thresholds are absolute byte counts compared against the sampled process
//! footprint. They must satisfy `warning < cleanup < critical`; the tier of a
//! sample is the highest threshold it reaches.
//!
//! | Tier     | Reached when            | Response                          |
//! |----------|-------------------------|-----------------------------------|
//! | Normal   | `used < warning`        | none                              |
//! | Warning  | `warning <= used`       | log only                          |
//! | Cleanup  | `cleanup <= used`       | evict LRU partitions              |
//! | Critical | `critical <= used`      | evict down to `critical_retained` |

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, ConfigError};
use crate::monitor::MemoryTier;

const MIB: u64 = 1024 * 1024;

/// The three byte thresholds that split memory usage into tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryThresholds {
    /// Usage at which a warning is logged.
    pub warning: u64,
    /// Usage at which least recently used partitions are evicted.
    pub cleanup: u64,
    /// Usage at which the cache is cut to its minimum.
    pub critical: u64,
}

impl MemoryThresholds {
    /// Builds thresholds from mebibyte values.
    pub fn from_mib(warning: u64, cleanup: u64, critical: u64) -> Self {
        Self {
            warning: warning.saturating_mul(MIB),
            cleanup: cleanup.saturating_mul(MIB),
            critical: critical.saturating_mul(MIB),
        }
    }

    /// Fails unless `warning < cleanup < critical`.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.warning < self.cleanup && self.cleanup < self.critical {
            Ok(())
        } else {
            Err(CacheError::InvalidThresholdUpdate {
                warning: self.warning,
                cleanup: self.cleanup,
                critical: self.critical,
            })
        }
    }

    /// Tier of a sample using `used_bytes`.
    pub fn tier_for(&self, used_bytes: u64) -> MemoryTier {
        if used_bytes >= self.critical {
            MemoryTier::Critical
        } else if used_bytes >= self.cleanup {
            MemoryTier::Cleanup
        } else if used_bytes >= self.warning {
            MemoryTier::Warning
        } else {
            MemoryTier::Normal
        }
    }

    /// Applies the fields present in `update`, leaving the others untouched.
    pub fn merged(&self, update: &ThresholdUpdate) -> Self {
        Self {
            warning: update.warning.unwrap_or(self.warning),
            cleanup: update.cleanup.unwrap_or(self.cleanup),
            critical: update.critical.unwrap_or(self.critical),
        }
    }

    /// Multiplies every threshold by `factor`, keeping them strictly increasing.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |value: u64| (value as f64 * factor).round().max(1.0) as u64;
        Self {
            warning: scale(self.warning),
            cleanup: scale(self.cleanup),
            critical: scale(self.critical),
        }
        .normalized()
    }

    /// Nudges `cleanup` and `critical` upward until the ordering holds.
    pub fn normalized(self) -> Self {
        let cleanup = self.cleanup.max(self.warning.saturating_add(1));
        let critical = self.critical.max(cleanup.saturating_add(1));
        Self {
            warning: self.warning,
            cleanup,
            critical,
        }
    }
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self::from_mib(300, 400, 500)
    }
}

/// A partial threshold change; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdUpdate {
    /// New warning threshold in bytes.
    pub warning: Option<u64>,
    /// New cleanup threshold in bytes.
    pub cleanup: Option<u64>,
    /// New critical threshold in bytes.
    pub critical: Option<u64>,
}

impl From<MemoryThresholds> for ThresholdUpdate {
    fn from(thresholds: MemoryThresholds) -> Self {
        Self {
            warning: Some(thresholds.warning),
            cleanup: Some(thresholds.cleanup),
            critical: Some(thresholds.critical),
        }
    }
}

/// Configuration for a [`MemoryMonitor`](crate::MemoryMonitor).
///
/// # Fields
///
/// - `thresholds`: Initial tier boundaries.
/// - `check_interval_secs`: Period of the background check loop.
/// - `min_retained`: Cleanup stops evicting once this many partitions remain.
/// - `critical_retained`: Critical pressure evicts down to this many partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryMonitorConfig {
    /// Initial tier boundaries.
    pub thresholds: MemoryThresholds,
    /// Background check period in seconds.
    pub check_interval_secs: u64,
    /// Partitions kept by a cleanup pass.
    pub min_retained: usize,
    /// Partitions kept by a critical pass.
    pub critical_retained: usize,
}

impl MemoryMonitorConfig {
    /// Background check period as a [`Duration`].
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("monitor.thresholds: {err}")))?;
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.check_interval_secs must be positive".to_string(),
            ));
        }
        if self.critical_retained > self.min_retained {
            return Err(ConfigError::Invalid(format!(
                "monitor.critical_retained ({}) must not exceed monitor.min_retained ({})",
                self.critical_retained, self.min_retained
            )));
        }
        Ok(())
    }
}

impl Default for MemoryMonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: MemoryThresholds::default(),
            check_interval_secs: 120,
            min_retained: 4,
            critical_retained: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        let t = MemoryThresholds {
            warning: 10,
            cleanup: 20,
            critical: 30,
        };
        assert_eq!(t.tier_for(9), MemoryTier::Normal);
        assert_eq!(t.tier_for(10), MemoryTier::Warning);
        assert_eq!(t.tier_for(20), MemoryTier::Cleanup);
        assert_eq!(t.tier_for(30), MemoryTier::Critical);
    }

    #[test]
    fn test_from_mib_saturates() {
        let t = MemoryThresholds::from_mib(300, u64::MAX / 2, u64::MAX);
        assert_eq!(t.warning, 300 * MIB);
        assert_eq!(t.cleanup, u64::MAX);
        assert_eq!(t.critical, u64::MAX);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_merge_keeps_missing_fields() {
        let t = MemoryThresholds::default();
        let merged = t.merged(&ThresholdUpdate {
            cleanup: Some(450 * MIB),
            ..ThresholdUpdate::default()
        });
        assert_eq!(merged.warning, t.warning);
        assert_eq!(merged.cleanup, 450 * MIB);
        assert_eq!(merged.critical, t.critical);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unordered() {
        let t = MemoryThresholds {
            warning: 10,
            cleanup: 10,
            critical: 30,
        };
        assert!(t.validate().is_err());
        assert!(t.normalized().validate().is_ok());
    }

    #[test]
    fn test_scaled_stays_ordered() {
        let t = MemoryThresholds::default().scaled(0.5);
        assert_eq!(t.critical, 250 * MIB);
        assert!(t.validate().is_ok());
    }
}
