//! Orchestrator configuration
//!
//! Loaded once at bootstrap from an optional TOML file plus `SPEECH_`
//! prefixed environment variables (nested keys separated by `__`, e.g.
//! `SPEECH_CACHE__ENABLED=false`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use ai_speech::ConnectionPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::model::Category;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SPEECH";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Values parsed but are out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Default per-provider dispatch timeout in milliseconds
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background health probing
    #[serde(default)]
    pub health: HealthMonitorConfig,

    /// Default network policy for provider connections
    #[serde(default)]
    pub connection: ConnectionPolicy,

    /// Per-provider settings keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

const fn default_dispatch_timeout_ms() -> u64 {
    30_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            health: HealthMonitorConfig::default(),
            connection: ConnectionPolicy::default(),
            providers: BTreeMap::new(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from `path` (if given) and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Default dispatch timeout as a `Duration`
    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error message naming the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatch_timeout_ms == 0 {
            return Err("dispatch_timeout_ms must be greater than 0".to_string());
        }
        self.circuit_breaker
            .validate()
            .map_err(|e| format!("circuit_breaker: {e}"))?;
        self.cache.validate().map_err(|e| format!("cache: {e}"))?;
        self.health.validate().map_err(|e| format!("health: {e}"))?;
        self.connection
            .validate()
            .map_err(|e| format!("connection: {e}"))?;

        for (name, settings) in &self.providers {
            settings
                .validate()
                .map_err(|e| format!("providers.{name}: {e}"))?;
        }
        Ok(())
    }
}

/// Result cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disabled cache always misses
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL for transcriptions in seconds
    #[serde(default = "default_ttl_secs")]
    pub stt_ttl_secs: u64,

    /// TTL for synthesized audio in seconds
    #[serde(default = "default_ttl_secs")]
    pub tts_ttl_secs: u64,

    /// In-memory cache capacity in megabytes
    #[serde(default = "default_max_capacity_mb")]
    pub max_capacity_mb: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_ttl_secs() -> u64 {
    86_400 // 24 hours
}

const fn default_max_capacity_mb() -> u64 {
    100
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stt_ttl_secs: default_ttl_secs(),
            tts_ttl_secs: default_ttl_secs(),
            max_capacity_mb: default_max_capacity_mb(),
        }
    }
}

impl CacheConfig {
    /// TTL for results of `category`
    #[must_use]
    pub const fn ttl_for(&self, category: Category) -> Duration {
        match category {
            Category::Stt => Duration::from_secs(self.stt_ttl_secs),
            Category::Tts => Duration::from_secs(self.tts_ttl_secs),
        }
    }

    /// Configuration with caching switched off
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.stt_ttl_secs == 0 || self.tts_ttl_secs == 0 {
            return Err("TTLs must be greater than 0 when the cache is enabled".to_string());
        }
        if self.max_capacity_mb == 0 {
            return Err("max_capacity_mb must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Background health monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Whether `initialize` starts the monitor
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between probe rounds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Deadline for a single probe in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Disable a provider after this many consecutive failed probes
    #[serde(default)]
    pub disable_after_failures: Option<u32>,
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_probe_timeout_ms() -> u64 {
    5_000
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            disable_after_failures: None,
        }
    }
}

impl HealthMonitorConfig {
    /// Probe interval as a `Duration`
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Probe deadline as a `Duration`
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval_secs must be greater than 0".to_string());
        }
        if self.probe_timeout_ms == 0 {
            return Err("probe_timeout_ms must be greater than 0".to_string());
        }
        if self.disable_after_failures == Some(0) {
            return Err("disable_after_failures must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Settings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Whether the provider takes part in fallback chains
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides the registered priority (lower is tried first)
    #[serde(default)]
    pub priority: Option<u32>,

    /// Overrides the dispatch timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Provider-specific values (credentials, endpoints, models)
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// Overrides the default connection policy
    #[serde(default)]
    pub connection: Option<ConnectionPolicy>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            timeout_ms: None,
            settings: BTreeMap::new(),
            connection: None,
        }
    }
}

impl ProviderSettings {
    fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if let Some(connection) = &self.connection {
            connection.validate()?;
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}
