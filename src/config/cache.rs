//! Configuration for the partition cache.
//!
//! # Sizing Guidelines
//!
//! `capacity` counts *partitions*, not bytes. A partition holds every word of
//! one language that starts with one letter, so its size varies a lot: a
//! Russian `п` list is many times larger than `э`. The memory monitor reacts
//! to the actual process footprint, so capacity only needs to be a sensible
//! upper bound:
//!
//! ```text
//! Resident memory ≈ capacity × average partition footprint
//! ```
//!
//! # Examples
//!
//! ```
//! use spellcache::config::PartitionCacheConfig;
//!
//! let config = PartitionCacheConfig {
//!     capacity: 12,
//!     ..PartitionCacheConfig::default()
//! };
//! assert_eq!(config.load_timeout().as_millis(), 5_000);
//! ```

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a [`PartitionCache`](crate::PartitionCache).
///
/// # Fields
///
/// - `capacity`: Maximum number of resident partitions. Must be at least 1.
/// - `load_timeout_ms`: How long a single store load may take before it is
///   reported as a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionCacheConfig {
    /// Maximum number of resident partitions.
    pub capacity: usize,
    /// Per-load timeout in milliseconds.
    pub load_timeout_ms: u64,
}

impl PartitionCacheConfig {
    /// Per-load timeout as a [`Duration`].
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        if self.load_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "cache.load_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PartitionCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            load_timeout_ms: 5_000,
        }
    }
}
