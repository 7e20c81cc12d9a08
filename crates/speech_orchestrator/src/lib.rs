//! Speech Orchestrator - fallback routing for STT and TTS providers
//!
//! Sits between callers and the `ai_speech` provider adapters:
//! - `ProviderFactory` - Named provider registry with lazy, shared instances
//! - `CircuitBreakerRegistry` - Per-provider circuit state and health snapshots
//! - `ResultCache` - Content-addressed response cache over a `CachePort`
//! - `SpeechOrchestrator` - Priority-ordered dispatch with fallback
//!
//! # Example
//!
//! ```ignore
//! use ai_speech::ConnectionManager;
//! use speech_orchestrator::{OrchestratorConfig, SpeechOrchestrator, TtsRequest};
//!
//! let config = OrchestratorConfig::load(Some(Path::new("speech.toml")))?;
//! let connections = ConnectionManager::new(config.connection.clone());
//! let orchestrator = SpeechOrchestrator::from_config(config, &connections)?;
//! orchestrator.initialize()?;
//!
//! let response = orchestrator.synthesize(&TtsRequest::new("Hallo Welt")).await?;
//! println!("{} via {}", response.audio().size_bytes(), response.provider_used());
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod factory;
pub mod health;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod telemetry;

pub use cache::{CacheError, CachePort, CacheStats, MokaCache, ResultCache};
pub use circuit_breaker::{Admission, CircuitBreakerConfig, CircuitBreakerRegistry};
pub use config::{
    CacheConfig, ConfigError, HealthMonitorConfig, OrchestratorConfig, ProviderSettings,
    TelemetryConfig,
};
pub use error::{FailureKind, OrchestratorError, ProviderFailure};
pub use factory::{
    ProviderConfig, ProviderConstructor, ProviderDescriptor, ProviderFactory, ProviderInstance,
};
pub use health::HealthMonitor;
pub use model::{
    CacheKey, Category, CircuitState, HealthStatus, ProviderHealth, ProviderOverride,
    SpeechRequest, SttRequest, SttResponse, TtsRequest, TtsResponse,
};
pub use orchestrator::SpeechOrchestrator;
pub use telemetry::{TelemetryError, init_tracing};
