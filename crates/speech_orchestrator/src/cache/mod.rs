//! Result cache
//!
//! - [`CachePort`]: byte-oriented key-value store with per-entry TTL
//! - [`MokaCache`]: in-memory implementation
//! - [`ResultCache`]: typed, failure-tolerant adapter used by the orchestrator

mod moka_cache;
mod result_cache;

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

pub use moka_cache::MokaCache;
pub use result_cache::ResultCache;

/// Cache backend errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend could not be reached
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Port for key-value cache backends
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CachePort: Send + Sync {
    /// Get a cached value
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set a value with its own time-to-live
    ///
    /// If the key already exists, its value and TTL are replaced.
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove one entry, returning whether it existed
    async fn invalidate(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry whose key starts with `prefix`
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Hit/miss counters and size
    fn stats(&self) -> CacheStats;
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Current number of entries
    pub entries: u64,
    /// Approximate memory usage in bytes
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Hit rate between 0.0 and 1.0
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
