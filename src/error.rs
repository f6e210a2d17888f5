//! Error types shared across the crate.
//!
//! Store failures are split into *permanent* ones (the partition does not
//! exist, or can never hold words) and *transient* ones (I/O hiccups,
//! timeouts). The cache remembers permanent failures as empty partitions and
//! retries transient ones on the next lookup.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::language::PartitionKey;

/// Failure reported by a [`PartitionStore`](crate::store::PartitionStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No word list exists for the key.
    #[error("partition {0} not found")]
    NotFound(PartitionKey),

    /// The key's letter never begins a word in its language.
    #[error("partition {0} is excluded: its letter never starts a word")]
    Excluded(PartitionKey),

    /// The backing file exceeds the configured size limit.
    #[error("partition {key} is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        /// Partition that was rejected.
        key: PartitionKey,
        /// Size reported by the filesystem.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Reading the partition failed.
    #[error("failed to read partition {key}: {source}")]
    Io {
        /// Partition being read.
        key: PartitionKey,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The store did not answer within the load timeout.
    #[error("loading partition {0} timed out after {1:?}")]
    Timeout(PartitionKey, Duration),
}

impl StoreError {
    /// Builds an [`StoreError::Io`] from a raw I/O error.
    pub fn io(key: PartitionKey, source: io::Error) -> Self {
        StoreError::Io {
            key,
            source: Arc::new(source),
        }
    }

    /// Returns `true` when retrying the load cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::Excluded(_) | StoreError::TooLarge { .. }
        )
    }

    /// Partition the failure refers to.
    pub fn key(&self) -> PartitionKey {
        match self {
            StoreError::NotFound(key)
            | StoreError::Excluded(key)
            | StoreError::Timeout(key, _)
            | StoreError::TooLarge { key, .. }
            | StoreError::Io { key, .. } => *key,
        }
    }
}

/// Errors surfaced by the cache, the monitor and the preloader.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A partition could not be produced for a lookup.
    #[error("partition {key} unavailable: {source}")]
    PartitionUnavailable {
        /// Requested partition.
        key: PartitionKey,
        /// Store failure behind it.
        #[source]
        source: StoreError,
    },

    /// A threshold update would break `warning < cleanup < critical`.
    #[error(
        "thresholds must be strictly increasing, got warning={warning} cleanup={cleanup} critical={critical}"
    )]
    InvalidThresholdUpdate {
        /// Resulting warning threshold in bytes.
        warning: u64,
        /// Resulting cleanup threshold in bytes.
        cleanup: u64,
        /// Resulting critical threshold in bytes.
        critical: u64,
    },

    /// Capacity must hold at least one partition.
    #[error("invalid capacity {0}: the cache must hold at least one partition")]
    InvalidCapacity(usize),

    /// A background preload did not produce a partition.
    #[error("preload of {key} failed: {source}")]
    PreloadFailure {
        /// Partition being warmed.
        key: PartitionKey,
        /// Store failure behind it.
        #[source]
        source: StoreError,
    },
}

/// A language code that the service does not support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    /// Unknown language code.
    #[error("unsupported language code '{0}'")]
    Unsupported(String),
}

/// Configuration could not be read or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The TOML did not match the expected schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    #[test]
    fn test_permanent_failures() {
        let key = PartitionKey::new(Language::Russian, 'а');
        assert!(StoreError::NotFound(key).is_permanent());
        assert!(StoreError::Excluded(key).is_permanent());
        assert!(!StoreError::Timeout(key, Duration::from_secs(1)).is_permanent());
        let io = StoreError::io(key, io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(!io.is_permanent());
        assert_eq!(io.key(), key);
    }

    #[test]
    fn test_error_messages_name_the_partition() {
        let key = PartitionKey::new(Language::English, 'q');
        let err = CacheError::PreloadFailure {
            key,
            source: StoreError::NotFound(key),
        };
        assert_eq!(
            err.to_string(),
            "preload of en_q failed: partition en_q not found"
        );
    }
}
