//! Pooled HTTP connections per provider
//!
//! Every provider gets its own `reqwest::Client` (and therefore its own
//! connection pool), built lazily on first use with that provider's
//! [`ConnectionPolicy`]. Handles are cheap clones sharing the pool, so they can
//! be checked out concurrently from any number of tasks.
//!
//! [`ProviderConnection::send`] is the single way a provider talks to its
//! vendor: it bounds concurrency, stamps a correlation id, applies the
//! timeout and retries transient failures.
//!
//! # Examples
//!
//! ```ignore
//! use ai_speech::connection::{ConnectionManager, ConnectionPolicy};
//!
//! let manager = ConnectionManager::new(ConnectionPolicy::default());
//! let connection = manager.connection("openai")?;
//!
//! let response = connection
//!     .send(|client| Ok(client.get("https://api.openai.com/v1/models")))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::SpeechError;
use crate::retry::{RetryConfig, with_retry};

/// Header name for request correlation ID
pub const X_REQUEST_ID: &str = "x-request-id";

/// Network policy applied to one provider's pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    /// Whole-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// TCP/TLS connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Idle connections kept per host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Seconds before an idle pooled connection is closed
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,

    /// Maximum requests in flight against this provider
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Backoff for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_pool_max_idle_per_host() -> usize {
    8
}

const fn default_pool_idle_timeout_secs() -> u64 {
    90
}

const fn default_max_concurrent_requests() -> usize {
    32
}

fn default_user_agent() -> String {
    format!("speech-orchestrator/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
            retry: RetryConfig::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl ConnectionPolicy {
    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the concurrency limit
    #[must_use]
    pub const fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Request timeout as a `Duration`
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout as a `Duration`
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be greater than 0".to_string());
        }
        if self.max_concurrent_requests == 0 {
            return Err("max_concurrent_requests must be greater than 0".to_string());
        }
        Ok(())
    }

    fn build_client(&self) -> Result<Client, SpeechError> {
        self.validate().map_err(SpeechError::Configuration)?;
        Client::builder()
            .timeout(self.timeout())
            .connect_timeout(self.connect_timeout())
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(self.pool_idle_timeout_secs))
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| SpeechError::Configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// Owner of every provider's connection pool
///
/// Cloning shares the underlying pools.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug, Default)]
struct ManagerInner {
    default_policy: ConnectionPolicy,
    policies: RwLock<HashMap<String, ConnectionPolicy>>,
    pools: RwLock<HashMap<String, ProviderConnection>>,
}

impl ConnectionManager {
    /// Create a manager applying `default_policy` to providers without their own
    #[must_use]
    pub fn new(default_policy: ConnectionPolicy) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                default_policy,
                policies: RwLock::new(HashMap::new()),
                pools: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Override the policy of one provider
    ///
    /// An existing pool is dropped; handles already checked out keep working
    /// with the old settings until they are released.
    pub fn set_policy(&self, provider: impl Into<String>, policy: ConnectionPolicy) {
        let provider = provider.into();
        self.inner.pools.write().remove(&provider);
        self.inner.policies.write().insert(provider, policy);
    }

    /// Policy that applies to `provider`
    #[must_use]
    pub fn policy(&self, provider: &str) -> ConnectionPolicy {
        self.inner
            .policies
            .read()
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.inner.default_policy.clone())
    }

    /// Check out a handle to `provider`'s pool, building it on first use
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if the policy is invalid or the
    /// HTTP client cannot be built.
    pub fn connection(&self, provider: &str) -> Result<ProviderConnection, SpeechError> {
        if let Some(existing) = self.inner.pools.read().get(provider) {
            return Ok(existing.clone());
        }

        let policy = self.policy(provider);
        let mut pools = self.inner.pools.write();
        // Another caller may have won the race while we waited for the lock.
        if let Some(existing) = pools.get(provider) {
            return Ok(existing.clone());
        }

        let connection = ProviderConnection::new(provider, policy)?;
        debug!(
            provider = %provider,
            max_concurrent = connection.policy.max_concurrent_requests,
            "Created connection pool"
        );
        pools.insert(provider.to_string(), connection.clone());
        Ok(connection)
    }

    /// Names of providers with a live pool
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.pools.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Shared handle to one provider's pool
#[derive(Debug, Clone)]
pub struct ProviderConnection {
    provider: Arc<str>,
    client: Client,
    policy: Arc<ConnectionPolicy>,
    permits: Arc<Semaphore>,
}

impl ProviderConnection {
    /// Build a standalone pool (normally obtained through [`ConnectionManager`])
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if the policy is invalid.
    pub fn new(provider: &str, policy: ConnectionPolicy) -> Result<Self, SpeechError> {
        let client = policy.build_client()?;
        Ok(Self {
            provider: Arc::from(provider),
            client,
            permits: Arc::new(Semaphore::new(policy.max_concurrent_requests)),
            policy: Arc::new(policy),
        })
    }

    /// Provider this pool belongs to
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Policy the pool was built with
    #[must_use]
    pub fn policy(&self) -> &ConnectionPolicy {
        &self.policy
    }

    /// Requests currently holding a permit
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.policy
            .max_concurrent_requests
            .saturating_sub(self.permits.available_permits())
    }

    /// Whether two handles share the same pool
    #[must_use]
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.permits, &other.permits)
    }

    /// Execute one logical request
    ///
    /// `build` is invoked once per attempt so non-cloneable bodies (multipart
    /// forms) can be recreated. Every attempt carries the same `x-request-id`.
    /// 429 and 5xx responses become retryable errors; any other status is
    /// handed back for vendor-specific parsing.
    ///
    /// # Errors
    ///
    /// Returns the last `SpeechError` once retries are exhausted or a
    /// non-retryable error occurs.
    #[instrument(skip(self, build), fields(provider = %self.provider))]
    pub async fn send<F>(&self, build: F) -> Result<Response, SpeechError>
    where
        F: Fn(&Client) -> Result<RequestBuilder, SpeechError> + Sync,
    {
        let request_id = Uuid::new_v4();
        let outcome = with_retry(&self.policy.retry, &self.provider, || {
            self.attempt(&build, request_id)
        })
        .await;

        if outcome.attempts > 1 {
            debug!(
                request_id = %request_id,
                attempts = outcome.attempts,
                ok = outcome.is_ok(),
                "Request finished after retries"
            );
        }
        outcome.into_result()
    }

    async fn attempt<F>(&self, build: &F, request_id: Uuid) -> Result<Response, SpeechError>
    where
        F: Fn(&Client) -> Result<RequestBuilder, SpeechError> + Sync,
    {
        let _permit = self.permits.acquire().await.map_err(|_| {
            SpeechError::NotAvailable(format!("connection pool for {} closed", self.provider))
        })?;

        let response = build(&self.client)?
            .header(X_REQUEST_ID, request_id.to_string())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SpeechError::RateLimited);
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::ServiceUnavailable(format!(
                "{} returned {status}: {body}",
                self.provider
            )));
        }

        Ok(response)
    }

    fn classify(&self, err: reqwest::Error) -> SpeechError {
        if err.is_timeout() {
            SpeechError::Timeout(self.policy.timeout_ms)
        } else {
            SpeechError::from(err)
        }
    }
}
