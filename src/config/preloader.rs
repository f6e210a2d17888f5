//! Configuration for the predictive preloader.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How eagerly partitions are warmed ahead of demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadStrategy {
    /// Half the usual number of loads per text; used under memory pressure.
    Conservative,
    /// The configured number of loads per text.
    #[default]
    Balanced,
    /// Twice the usual number of loads per text.
    Aggressive,
}

impl PreloadStrategy {
    /// Number of loads one analyzed text may start, given the configured base.
    pub fn max_loads(&self, base: usize) -> usize {
        match self {
            PreloadStrategy::Conservative => (base / 2).max(1),
            PreloadStrategy::Balanced => base.max(1),
            PreloadStrategy::Aggressive => base.max(1).saturating_mul(2),
        }
    }

    /// Lowercase name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadStrategy::Conservative => "conservative",
            PreloadStrategy::Balanced => "balanced",
            PreloadStrategy::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for PreloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for an [`IntelligentPreloader`](crate::IntelligentPreloader).
///
/// # Fields
///
/// - `min_text_chars`: Texts shorter than this are ignored.
/// - `short_text_chars`: Texts shorter than this also warm the language's
///   most common initial letters.
/// - `max_loads_per_text`: Base number of loads one text may start; scaled
///   by the active [`PreloadStrategy`].
/// - `max_concurrent_loads`: Loads in flight across all preload calls.
/// - `activity_floor`: Resident partitions with fewer hits than this are
///   candidates for the optimization sweep.
/// - `sweep_min_age_secs`: Partitions younger than this are never swept.
/// - `sweep_min_retained`: The sweep stops once this many partitions remain.
/// - `hot_keys`: How many of the most used partitions the sweep protects
///   and warms.
/// - `usage_max_age_secs`: Default age after which usage records are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloaderConfig {
    /// Minimum analyzable text length in characters.
    pub min_text_chars: usize,
    /// Texts below this length also warm common initials.
    pub short_text_chars: usize,
    /// Base number of loads per analyzed text.
    pub max_loads_per_text: usize,
    /// Concurrent loads across all calls.
    pub max_concurrent_loads: usize,
    /// Hit count below which a partition counts as idle.
    pub activity_floor: u64,
    /// Grace period before a partition can be swept, in seconds.
    pub sweep_min_age_secs: u64,
    /// Partitions kept by the sweep.
    pub sweep_min_retained: usize,
    /// Number of most used partitions protected and warmed.
    pub hot_keys: usize,
    /// Usage record lifetime in seconds.
    pub usage_max_age_secs: u64,
    /// Strategy in effect at startup.
    pub strategy: PreloadStrategy,
}

impl PreloaderConfig {
    /// Sweep grace period as a [`Duration`].
    pub fn sweep_min_age(&self) -> Duration {
        Duration::from_secs(self.sweep_min_age_secs)
    }

    /// Usage record lifetime as a [`Duration`].
    pub fn usage_max_age(&self) -> Duration {
        Duration::from_secs(self.usage_max_age_secs)
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_loads_per_text == 0 {
            return Err(ConfigError::Invalid(
                "preloader.max_loads_per_text must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_loads == 0 {
            return Err(ConfigError::Invalid(
                "preloader.max_concurrent_loads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            short_text_chars: 100,
            max_loads_per_text: 4,
            max_concurrent_loads: 2,
            activity_floor: 1,
            sweep_min_age_secs: 60,
            sweep_min_retained: 2,
            hot_keys: 8,
            usage_max_age_secs: 24 * 60 * 60,
            strategy: PreloadStrategy::Balanced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_scales_loads() {
        assert_eq!(PreloadStrategy::Conservative.max_loads(4), 2);
        assert_eq!(PreloadStrategy::Conservative.max_loads(1), 1);
        assert_eq!(PreloadStrategy::Balanced.max_loads(4), 4);
        assert_eq!(PreloadStrategy::Aggressive.max_loads(4), 8);
    }
}
