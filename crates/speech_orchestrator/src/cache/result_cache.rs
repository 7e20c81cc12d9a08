//! Typed result cache adapter
//!
//! Backend and decode failures degrade to a miss and write failures are only
//! logged; a broken cache never fails a request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{CachePort, CacheStats};
use crate::config::CacheConfig;
use crate::model::{CacheKey, Category};

/// Serde-typed view over a [`CachePort`]
#[derive(Clone)]
pub struct ResultCache {
    port: Arc<dyn CachePort>,
    config: CacheConfig,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("stats", &self.port.stats())
            .finish()
    }
}

impl ResultCache {
    /// Wrap a cache backend
    pub fn new(port: Arc<dyn CachePort>, config: CacheConfig) -> Self {
        Self { port, config }
    }

    /// Whether lookups can hit
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// TTL for results of `category`
    #[must_use]
    pub const fn ttl_for(&self, category: Category) -> Duration {
        self.config.ttl_for(category)
    }

    /// Look up a cached response
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        match self.port.get_bytes(key.as_str()).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                },
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            },
        }
    }

    /// Store a response, best effort
    pub async fn put<T: Serialize + Sync>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        if !self.config.enabled {
            return;
        }
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            },
        };
        match self.port.set_bytes(key.as_str(), bytes, ttl).await {
            Ok(()) => debug!(key = %key, "Cached result"),
            Err(e) => warn!(key = %key, error = %e, "Cache write failed"),
        }
    }

    /// Drop one entry
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.port
            .invalidate(key.as_str())
            .await
            .unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "Cache invalidation failed");
                false
            })
    }

    /// Drop every cached result of `category`
    pub async fn clear(&self, category: Category) -> u64 {
        let prefix = format!("{}:", category.cache_namespace());
        self.port
            .invalidate_prefix(&prefix)
            .await
            .unwrap_or_else(|e| {
                warn!(prefix = %prefix, error = %e, "Cache clear failed");
                0
            })
    }

    /// Backend statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.port.stats()
    }
}

#[cfg(test)]
mod tests {
    use ai_speech::{AudioData, AudioFormat};

    use super::super::{CacheError, MockCachePort, MokaCache};
    use super::*;
    use crate::model::{SpeechRequest, SttRequest, TtsRequest};

    fn key() -> CacheKey {
        SttRequest::new(AudioData::new(vec![1, 2, 3], AudioFormat::Wav))
            .cache_key()
            .clone()
    }

    #[tokio::test]
    async fn round_trips_through_backend() {
        let cache = ResultCache::new(Arc::new(MokaCache::new()), CacheConfig::default());
        let key = key();

        cache
            .put(&key, &vec!["a".to_string()], Duration::from_secs(60))
            .await;
        let value: Option<Vec<String>> = cache.get(&key).await;

        assert_eq!(value, Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn backend_read_error_is_a_miss() {
        let mut port = MockCachePort::new();
        port.expect_get_bytes()
            .returning(|_| Err(CacheError::Unavailable("connection refused".into())));

        let cache = ResultCache::new(Arc::new(port), CacheConfig::default());
        let value: Option<String> = cache.get(&key()).await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let mut port = MockCachePort::new();
        port.expect_get_bytes()
            .returning(|_| Ok(Some(b"not json".to_vec())));

        let cache = ResultCache::new(Arc::new(port), CacheConfig::default());
        let value: Option<Vec<u32>> = cache.get(&key()).await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn write_error_is_swallowed() {
        let key = key();
        let mut port = MockCachePort::new();
        port.expect_set_bytes()
            .withf(|_, value, ttl| value == b"42" && *ttl == Duration::from_secs(5))
            .times(1)
            .returning(|_, _, _| Err(CacheError::Unavailable("disk full".into())));

        let cache = ResultCache::new(Arc::new(port), CacheConfig::default());
        cache.put(&key, &42u32, Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn disabled_cache_never_touches_backend() {
        let port = MockCachePort::new();
        let cache = ResultCache::new(Arc::new(port), CacheConfig::disabled());

        cache.put(&key(), &1u8, Duration::from_secs(1)).await;
        let value: Option<u8> = cache.get(&key()).await;

        assert!(value.is_none());
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn clear_uses_category_namespace() {
        let backend = Arc::new(MokaCache::new());
        let cache = ResultCache::new(backend, CacheConfig::default());
        let stt = key();
        let tts = TtsRequest::new("hello").cache_key().clone();
        cache.put(&stt, &1u8, Duration::from_secs(60)).await;
        cache.put(&tts, &2u8, Duration::from_secs(60)).await;

        assert_eq!(cache.clear(Category::Stt).await, 1);
        assert_eq!(cache.get::<u8>(&stt).await, None);
        assert_eq!(cache.get::<u8>(&tts).await, Some(2));
        assert!(!cache.invalidate(&stt).await);
        assert!(cache.invalidate(&tts).await);
    }
}
