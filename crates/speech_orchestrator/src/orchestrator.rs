//! Speech orchestrator
//!
//! One generic fallback algorithm serves both categories:
//!
//! 1. Return a cached response when the request's cache key hits.
//! 2. Resolve the priority chain, applying any provider override.
//! 3. For each candidate: ask the circuit breaker, build the instance, check
//!    capabilities and dispatch. Construction and dispatch each run under the
//!    provider's timeout, raced against cancellation.
//! 4. Record the outcome; the first success is cached and returned.
//! 5. If nothing succeeds, fail with every per-provider reason in order.
//!
//! Cancellation records nothing against provider health.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ai_speech::{ConnectionManager, SpeechError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CachePort, CacheStats, MokaCache, ResultCache};
use crate::circuit_breaker::{Admission, CircuitBreakerRegistry};
use crate::config::OrchestratorConfig;
use crate::error::{FailureKind, OrchestratorError, ProviderFailure};
use crate::factory::{ProviderDescriptor, ProviderFactory};
use crate::health::HealthMonitor;
use crate::model::{
    Category, ProviderHealth, SpeechRequest, SttRequest, SttResponse, TtsRequest, TtsResponse,
};
use crate::providers;

/// Releases a half-open trial unless an outcome was recorded
struct TrialGuard<'a> {
    breakers: &'a CircuitBreakerRegistry,
    name: &'a str,
    armed: bool,
}

impl<'a> TrialGuard<'a> {
    const fn new(breakers: &'a CircuitBreakerRegistry, name: &'a str, admission: Admission) -> Self {
        Self {
            breakers,
            name,
            armed: matches!(admission, Admission::Trial),
        }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breakers.abandon_trial(self.name);
        }
    }
}

/// Why one candidate did not produce a response
enum AttemptError {
    Cancelled,
    Failed {
        failure: ProviderFailure,
        source: Option<SpeechError>,
    },
}

impl AttemptError {
    fn failed(provider: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            failure: ProviderFailure::new(provider, kind, message),
            source: None,
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    monitor: Option<JoinHandle<()>>,
}

/// Coordinates STT and TTS requests across providers
pub struct SpeechOrchestrator {
    factory: Arc<ProviderFactory>,
    breakers: Arc<CircuitBreakerRegistry>,
    cache: ResultCache,
    config: OrchestratorConfig,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl fmt::Debug for SpeechOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechOrchestrator")
            .field("factory", &self.factory)
            .field("breakers", &self.breakers)
            .field("cache", &self.cache)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl SpeechOrchestrator {
    /// Create an orchestrator over an existing factory and cache backend
    pub fn new(
        factory: Arc<ProviderFactory>,
        cache_port: Arc<dyn CachePort>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate().map_err(OrchestratorError::Configuration)?;

        Ok(Self {
            factory,
            breakers: Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone())),
            cache: ResultCache::new(cache_port, config.cache.clone()),
            config,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Create an orchestrator with the built-in providers and an in-memory cache
    ///
    /// Provider settings from `config` are applied on top of the built-in
    /// registrations; pools come from `connections`.
    pub fn from_config(
        config: OrchestratorConfig,
        connections: &ConnectionManager,
    ) -> Result<Self, OrchestratorError> {
        let factory = Arc::new(ProviderFactory::new());
        providers::register_builtin(&factory, connections)?;
        providers::apply_settings(&factory, connections, &config.providers)?;

        let cache = Arc::new(MokaCache::with_max_capacity_mb(config.cache.max_capacity_mb));
        Self::new(factory, cache, config)
    }

    /// Validate providers and start background work
    ///
    /// Calling it on a running orchestrator is a no-op.
    pub fn initialize(&self) -> Result<(), OrchestratorError> {
        let mut lifecycle = self.lifecycle.lock();
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        self.factory.validate_configured()?;

        if self.config.health.enabled {
            let cancel = CancellationToken::new();
            let monitor = Arc::new(HealthMonitor::new(
                Arc::clone(&self.factory),
                Arc::clone(&self.breakers),
                self.config.health.clone(),
            ));
            lifecycle.monitor = Some(monitor.spawn(cancel.clone()));
            lifecycle.cancel = Some(cancel);
        }

        self.running.store(true, Ordering::Release);
        info!(
            stt = ?self.factory.priority_chain(Category::Stt),
            tts = ?self.factory.priority_chain(Category::Tts),
            "Speech orchestrator initialized"
        );
        Ok(())
    }

    /// Stop background work; later requests fail with `NotRunning`
    pub async fn shutdown(&self) {
        let (cancel, monitor) = {
            let mut lifecycle = self.lifecycle.lock();
            self.running.store(false, Ordering::Release);
            (lifecycle.cancel.take(), lifecycle.monitor.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(monitor) = monitor {
            if let Err(e) = monitor.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
        info!("Speech orchestrator shut down");
    }

    /// Whether requests are accepted
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Transcribe audio
    pub async fn transcribe(&self, request: &SttRequest) -> Result<SttResponse, OrchestratorError> {
        self.execute(request, &CancellationToken::new()).await
    }

    /// Transcribe audio, aborting when `cancel` fires
    pub async fn transcribe_with_cancel(
        &self,
        request: &SttRequest,
        cancel: &CancellationToken,
    ) -> Result<SttResponse, OrchestratorError> {
        self.execute(request, cancel).await
    }

    /// Synthesize speech
    pub async fn synthesize(&self, request: &TtsRequest) -> Result<TtsResponse, OrchestratorError> {
        self.execute(request, &CancellationToken::new()).await
    }

    /// Synthesize speech, aborting when `cancel` fires
    pub async fn synthesize_with_cancel(
        &self,
        request: &TtsRequest,
        cancel: &CancellationToken,
    ) -> Result<TtsResponse, OrchestratorError> {
        self.execute(request, cancel).await
    }

    /// Run `request` through cache and fallback chain
    #[instrument(skip_all, fields(category = %R::CATEGORY, key = %request.cache_key()))]
    pub async fn execute<R: SpeechRequest>(
        &self,
        request: &R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, OrchestratorError> {
        if !self.is_running() {
            return Err(OrchestratorError::NotRunning);
        }
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        request.validate()?;

        let category = R::CATEGORY;
        let started = Instant::now();
        metrics::counter!("speech_requests_total", "category" => category.cache_namespace())
            .increment(1);

        if let Some(cached) = self.cache.get::<R::Response>(request.cache_key()).await {
            metrics::counter!("speech_cache_hits_total", "category" => category.cache_namespace())
                .increment(1);
            debug!("Serving cached response");
            return Ok(R::from_cache(cached, elapsed_ms(started)));
        }

        let (chain, strict) = self.resolve_chain(request)?;
        let mut failures = Vec::with_capacity(chain.len());

        for name in &chain {
            match self.attempt(request, name, cancel, started).await {
                Ok(response) => {
                    self.cache
                        .put(request.cache_key(), &response, self.cache.ttl_for(category))
                        .await;
                    return Ok(response);
                },
                Err(AttemptError::Cancelled) => {
                    info!(provider = %name, "Request cancelled by caller");
                    return Err(OrchestratorError::Cancelled);
                },
                Err(AttemptError::Failed { failure, source }) => {
                    metrics::counter!(
                        "speech_provider_failures_total",
                        "provider" => name.clone(),
                        "kind" => failure.kind.as_str()
                    )
                    .increment(1);
                    warn!(
                        provider = %name,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Provider attempt failed"
                    );

                    if strict {
                        let error = match source {
                            Some(source) => OrchestratorError::ProviderOperation {
                                provider: failure.provider,
                                source,
                            },
                            None => OrchestratorError::ProviderUnavailable {
                                provider: failure.provider,
                                reason: failure.message,
                            },
                        };
                        return Err(OrchestratorError::StrictOverrideFailed(Box::new(error)));
                    }
                    failures.push(failure);
                },
            }
        }

        Err(OrchestratorError::AllProvidersExhausted { category, failures })
    }

    /// Fallback chain for `request` and whether it is strict
    fn resolve_chain<R: SpeechRequest>(
        &self,
        request: &R,
    ) -> Result<(Vec<String>, bool), OrchestratorError> {
        let category = R::CATEGORY;
        let mut chain = self.factory.priority_chain(category);

        if let Some(preferred) = request.provider_override() {
            let usable = self
                .factory
                .descriptor(&preferred.name)
                .is_some_and(|d| d.category == category && d.enabled);

            if preferred.strict {
                if !usable {
                    return Err(OrchestratorError::StrictOverrideFailed(Box::new(
                        OrchestratorError::ProviderUnavailable {
                            provider: preferred.name.clone(),
                            reason: format!("not an enabled {category} provider"),
                        },
                    )));
                }
                return Ok((vec![preferred.name.clone()], true));
            }

            if usable {
                chain.retain(|name| name != &preferred.name);
                chain.insert(0, preferred.name.clone());
            } else {
                warn!(
                    provider = %preferred.name,
                    "Ignoring override for a provider that is not an enabled {category} provider"
                );
            }
        }

        if chain.is_empty() {
            return Err(OrchestratorError::NoProvidersConfigured(category));
        }
        Ok((chain, false))
    }

    async fn attempt<R: SpeechRequest>(
        &self,
        request: &R,
        name: &str,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<R::Response, AttemptError> {
        let admission = self.breakers.admit(name);
        if admission == Admission::Denied {
            return Err(AttemptError::failed(name, FailureKind::CircuitOpen, "circuit open"));
        }
        let mut trial = TrialGuard::new(&self.breakers, name, admission);

        // Construction and dispatch are each bounded by the provider's timeout.
        let timeout = self
            .factory
            .descriptor(name)
            .and_then(|d| d.dispatch_timeout)
            .unwrap_or_else(|| self.config.dispatch_timeout());

        let construction = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AttemptError::Cancelled),
            result = tokio::time::timeout(timeout, self.factory.instance(name)) => result,
        };
        let instance = match construction {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => {
                let message = e.to_string();
                self.breakers.record_failure(name, admission, &message);
                trial.disarm();
                return Err(AttemptError::failed(name, FailureKind::Construction, message));
            },
            Err(_) => {
                let message = format!(
                    "provider construction timed out after {}ms",
                    duration_ms(timeout)
                );
                self.breakers.record_failure(name, admission, &message);
                trial.disarm();
                return Err(AttemptError::failed(name, FailureKind::Construction, message));
            },
        };

        if let Err(reason) = request.check_capabilities(instance.capabilities()) {
            debug!(provider = %name, reason = %reason, "Provider cannot serve request");
            return Err(AttemptError::failed(name, FailureKind::Unsupported, reason));
        }

        let dispatched = Instant::now();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AttemptError::Cancelled),
            outcome = tokio::time::timeout(timeout, request.dispatch(&instance)) => outcome,
        };
        let latency_ms = elapsed_ms(dispatched);

        match outcome {
            Ok(Ok(output)) => {
                self.breakers.record_success(name, admission, latency_ms);
                trial.disarm();
                debug!(provider = %name, latency_ms, "Provider dispatch succeeded");
                Ok(request.into_response(output, name, elapsed_ms(started)))
            },
            Ok(Err(e)) => {
                let message = e.to_string();
                self.breakers.record_failure(name, admission, &message);
                trial.disarm();
                Err(AttemptError::Failed {
                    failure: ProviderFailure::new(name, FailureKind::Operation, message),
                    source: Some(e),
                })
            },
            Err(_) => {
                let e = SpeechError::Timeout(duration_ms(timeout));
                let message = e.to_string();
                self.breakers.record_failure(name, admission, &message);
                trial.disarm();
                Err(AttemptError::Failed {
                    failure: ProviderFailure::new(name, FailureKind::Timeout, message),
                    source: Some(e),
                })
            },
        }
    }

    /// Health of every registered provider
    ///
    /// Providers that were never dispatched to report `unknown`.
    #[must_use]
    pub fn health_snapshot_all(&self) -> BTreeMap<String, ProviderHealth> {
        let mut snapshot: BTreeMap<String, ProviderHealth> = self
            .factory
            .names()
            .into_iter()
            .map(|name| (name, ProviderHealth::unknown()))
            .collect();
        snapshot.extend(self.breakers.health_snapshot_all());
        snapshot
    }

    /// Health of one provider
    #[must_use]
    pub fn health_snapshot(&self, name: &str) -> ProviderHealth {
        self.breakers.health_snapshot(name)
    }

    /// Force a provider's circuit closed
    pub fn reset_provider(&self, name: &str) -> Result<(), OrchestratorError> {
        if self.factory.descriptor(name).is_none() {
            return Err(OrchestratorError::UnknownProvider(name.to_string()));
        }
        self.breakers.reset(name);
        Ok(())
    }

    /// Toggle a provider in or out of the fallback chain
    pub fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), OrchestratorError> {
        self.factory.set_enabled(name, enabled).map(|_| ())
    }

    /// Registered providers of `category` in fallback order, including disabled ones
    #[must_use]
    pub fn list_providers(&self, category: Category) -> Vec<ProviderDescriptor> {
        self.factory.list_available(category, false)
    }

    /// Result cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached result of `category`
    pub async fn clear_cache(&self, category: Category) -> u64 {
        self.cache.clear(category).await
    }

    /// Provider factory
    #[must_use]
    pub const fn factory(&self) -> &Arc<ProviderFactory> {
        &self.factory
    }

    /// Circuit breaker registry
    #[must_use]
    pub const fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
