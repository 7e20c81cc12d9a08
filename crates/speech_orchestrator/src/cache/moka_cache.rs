//! Moka in-memory cache implementation
//!
//! Thread-safe in-memory cache where every entry carries its own TTL.
//! Entries expire lazily and are evicted by size when capacity is reached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tracing::{debug, instrument};

use super::{CacheError, CachePort, CacheStats};

/// Maximum cache size in MB
const DEFAULT_MAX_CAPACITY_MB: u64 = 100;

#[derive(Clone)]
struct CachedValue {
    data: Vec<u8>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Moka-based in-memory cache
pub struct MokaCache {
    cache: Cache<String, CachedValue>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("entries", &self.cache.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl MokaCache {
    /// Create a cache with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_capacity_mb(DEFAULT_MAX_CAPACITY_MB)
    }

    /// Create a cache bounded to `max_capacity_mb` of payload
    #[must_use]
    pub fn with_max_capacity_mb(max_capacity_mb: u64) -> Self {
        let max_capacity_bytes = max_capacity_mb.saturating_mul(1024 * 1024);

        let cache = Cache::builder()
            .max_capacity(max_capacity_bytes)
            .expire_after(PerEntryTtl)
            .weigher(|key: &String, value: &CachedValue| -> u32 {
                // Weight by size in bytes, capped at u32::MAX
                (key.len() + value.data.len())
                    .try_into()
                    .unwrap_or(u32::MAX)
            })
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CachePort for MokaCache {
    #[instrument(skip(self), level = "debug")]
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(value) = self.cache.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
            Ok(Some(value.data))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache miss");
            Ok(None)
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_string(), CachedValue { data: value, ttl })
            .await;
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.cache.remove(key).await.is_some();
        debug!(key = %key, removed, "Cache invalidated");
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.cache.run_pending_tasks().await;

        // Collect first; the iterator must not be held across awaits.
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();

        let mut count = 0u64;
        for key in keys {
            self.cache.invalidate(&key).await;
            count += 1;
        }

        debug!(prefix = %prefix, count, "Prefix invalidation complete");
        Ok(count)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
            memory_bytes: self.cache.weighted_size(),
        }
    }
}
