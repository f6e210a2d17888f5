//! Configuration Module
//!
//! Every component takes a plain configuration struct with public fields and
//! a [`Default`] matching the production settings. [`SpellcheckConfig`]
//! aggregates them and is what a service reads from its TOML file.
//!
//! | Section       | Struct                   | Used by                                                |
//! |---------------|--------------------------|--------------------------------------------------------|
//! | `[cache]`     | [`PartitionCacheConfig`] | [`PartitionCache`](crate::PartitionCache)              |
//! | `[monitor]`   | [`MemoryMonitorConfig`]  | [`MemoryMonitor`](crate::MemoryMonitor)                |
//! | `[preloader]` | [`PreloaderConfig`]      | [`IntelligentPreloader`](crate::IntelligentPreloader)  |
//! | `[adaptive]`  | [`AdaptiveConfig`]       | [`AdaptiveMemoryManager`](crate::AdaptiveMemoryManager)|
//! | `[checker]`   | [`CheckerConfig`]        | [`SpellChecker`](crate::SpellChecker)                  |
//!
//! Missing sections and fields fall back to their defaults.
//!
//! # Examples
//!
//! ```
//! use spellcache::config::SpellcheckConfig;
//!
//! let config = SpellcheckConfig::from_toml_str(
//!     r#"
//!     [cache]
//!     capacity = 12
//!
//!     [monitor.thresholds]
//!     warning = 104857600
//!     cleanup = 209715200
//!     critical = 314572800
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.cache.capacity, 12);
//! assert_eq!(config.preloader.min_text_chars, 10);
//! ```

pub mod adaptive;
pub mod cache;
pub mod monitor;
pub mod preloader;

pub use adaptive::AdaptiveConfig;
pub use cache::PartitionCacheConfig;
pub use monitor::{MemoryMonitorConfig, MemoryThresholds, ThresholdUpdate};
pub use preloader::{PreloadStrategy, PreloaderConfig};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for the [`SpellChecker`](crate::SpellChecker) facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Texts longer than this many characters trigger preloading.
    pub preload_text_chars: usize,
    /// Start the automatic optimization loop in [`SpellChecker::start`](crate::SpellChecker::start).
    pub auto_optimize: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            preload_text_chars: 20,
            auto_optimize: false,
        }
    }
}

/// Configuration of the whole subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellcheckConfig {
    /// Partition cache settings.
    pub cache: PartitionCacheConfig,
    /// Memory monitor settings.
    pub monitor: MemoryMonitorConfig,
    /// Preloader settings.
    pub preloader: PreloaderConfig,
    /// Adaptive manager settings.
    pub adaptive: AdaptiveConfig,
    /// Facade settings.
    pub checker: CheckerConfig,
}

impl SpellcheckConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: SpellcheckConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Checks every section and the constraints between them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.monitor.validate()?;
        self.preloader.validate()?;
        self.adaptive.validate()?;
        if self.monitor.min_retained > self.adaptive.max_capacity {
            return Err(ConfigError::Invalid(format!(
                "monitor.min_retained ({}) exceeds adaptive.max_capacity ({})",
                self.monitor.min_retained, self.adaptive.max_capacity
            )));
        }
        Ok(())
    }
}
