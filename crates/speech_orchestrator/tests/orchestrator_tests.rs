//! End-to-end fallback, circuit breaking and caching scenarios
//!
//! Providers are scripted in-process stubs; the cache is the real moka backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ai_speech::{
    AudioData, AudioFormat, Capabilities, SpeechError, SpeechToText, SynthesisOptions,
    TextToSpeech, Transcription, TranscriptionOptions, VoiceInfo,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use speech_orchestrator::{
    CacheConfig, Category, CircuitBreakerConfig, CircuitState, FailureKind, HealthMonitorConfig,
    HealthStatus, MokaCache, OrchestratorConfig, OrchestratorError, ProviderConstructor,
    ProviderDescriptor, ProviderFactory, ProviderInstance, SpeechOrchestrator, SttRequest,
    TtsRequest,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

/// Scripted provider serving both categories
struct Scripted {
    name: &'static str,
    behaviour: Arc<Mutex<Behaviour>>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
    capabilities: Capabilities,
}

impl Scripted {
    async fn run(&self) -> Result<(), SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let behaviour = *self.behaviour.lock();
        match behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(SpeechError::ServiceUnavailable(format!(
                "{} is down",
                self.name
            ))),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl SpeechToText for Scripted {
    async fn transcribe(
        &self,
        audio: AudioData,
        _options: &TranscriptionOptions,
    ) -> Result<Transcription, SpeechError> {
        self.run().await?;
        Ok(Transcription::new(format!("{} heard {} bytes", self.name, audio.size_bytes()))
            .with_language("de"))
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl TextToSpeech for Scripted {
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<AudioData, SpeechError> {
        self.run().await?;
        let format = options.format.unwrap_or(AudioFormat::Mp3);
        Ok(AudioData::new(text.as_bytes().to_vec(), format))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError> {
        Ok(vec![])
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        self.name
    }

    fn default_voice(&self) -> &str {
        "house"
    }
}

/// Test-side handle to a scripted provider
#[derive(Clone)]
struct Stub {
    name: &'static str,
    behaviour: Arc<Mutex<Behaviour>>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
    formats: Vec<AudioFormat>,
}

impl Stub {
    fn new(name: &'static str, behaviour: Behaviour) -> Self {
        Self {
            name,
            behaviour: Arc::new(Mutex::new(behaviour)),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            formats: vec![AudioFormat::Wav, AudioFormat::Mp3],
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_formats(mut self, formats: &[AudioFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock() = behaviour;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn provider(&self) -> Arc<Scripted> {
        Arc::new(Scripted {
            name: self.name,
            behaviour: Arc::clone(&self.behaviour),
            calls: Arc::clone(&self.calls),
            delay: self.delay,
            capabilities: Capabilities::new(self.formats.iter().copied()),
        })
    }

    fn descriptor(&self, category: Category, priority: u32) -> ProviderDescriptor {
        let stub = self.clone();
        ProviderDescriptor::new(
            self.name,
            category,
            ProviderConstructor::from_fn(move |_| {
                Ok(match category {
                    Category::Stt => ProviderInstance::Stt(stub.provider()),
                    Category::Tts => ProviderInstance::Tts(stub.provider()),
                })
            }),
        )
        .with_priority(priority)
    }
}

fn config(breaker: CircuitBreakerConfig) -> OrchestratorConfig {
    OrchestratorConfig {
        circuit_breaker: breaker,
        health: HealthMonitorConfig {
            enabled: false,
            ..HealthMonitorConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

fn start(factory: ProviderFactory, config: OrchestratorConfig) -> SpeechOrchestrator {
    let orchestrator =
        SpeechOrchestrator::new(Arc::new(factory), Arc::new(MokaCache::new()), config).unwrap();
    orchestrator.initialize().unwrap();
    orchestrator
}

/// STT orchestrator over `stubs` in the given priority order
fn stt(stubs: &[&Stub], breaker: CircuitBreakerConfig) -> SpeechOrchestrator {
    let factory = ProviderFactory::new();
    for (position, stub) in (1u32..).zip(stubs) {
        factory
            .register(stub.descriptor(Category::Stt, position))
            .unwrap();
    }
    start(factory, config(breaker))
}

fn quick_breaker(threshold: u32, recovery_ms: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: threshold,
        recovery_timeout_ms: recovery_ms,
        ..CircuitBreakerConfig::default()
    }
}

/// Distinct audio per call so results never come from the cache
fn audio(seed: u8) -> SttRequest {
    SttRequest::new(AudioData::new(vec![seed, 1, 2, 3], AudioFormat::Wav))
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        let first = orchestrator.transcribe(&audio(1)).await.unwrap();
        let second = orchestrator.transcribe(&audio(1)).await.unwrap();

        assert_eq!(a.calls(), 1);
        assert!(!first.cached());
        assert!(second.cached());
        assert_eq!(second.text(), first.text());
        assert_eq!(second.provider_used(), "a");
    }

    #[tokio::test]
    async fn different_language_is_a_different_entry() {
        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        orchestrator.transcribe(&audio(1)).await.unwrap();
        orchestrator
            .transcribe(&audio(1).with_language("en"))
            .await
            .unwrap();

        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_never_cached() {
        let a = Stub::new("a", Behaviour::Fail);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        assert!(orchestrator.transcribe(&audio(1)).await.is_err());
        a.set(Behaviour::Succeed);
        let response = orchestrator.transcribe(&audio(1)).await.unwrap();

        assert!(!response.cached());
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_dispatches() {
        let a = Stub::new("a", Behaviour::Succeed);
        let factory = ProviderFactory::new();
        factory.register(a.descriptor(Category::Stt, 1)).unwrap();
        let orchestrator = start(
            factory,
            OrchestratorConfig {
                cache: CacheConfig::disabled(),
                ..config(CircuitBreakerConfig::default())
            },
        );

        orchestrator.transcribe(&audio(1)).await.unwrap();
        orchestrator.transcribe(&audio(1)).await.unwrap();
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn clearing_a_category_forces_redispatch() {
        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        orchestrator.transcribe(&audio(1)).await.unwrap();
        orchestrator.clear_cache(Category::Stt).await;
        orchestrator.transcribe(&audio(1)).await.unwrap();

        assert_eq!(a.calls(), 2);
    }
}

mod fallback {
    use super::*;

    #[tokio::test]
    async fn single_healthy_provider_wins_at_any_position() {
        for healthy in 0..3 {
            let stubs: Vec<Stub> = ["a", "b", "c"]
                .into_iter()
                .enumerate()
                .map(|(i, name)| {
                    let behaviour = if i == healthy {
                        Behaviour::Succeed
                    } else {
                        Behaviour::Fail
                    };
                    Stub::new(name, behaviour)
                })
                .collect();
            let refs: Vec<&Stub> = stubs.iter().collect();
            let orchestrator = stt(&refs, CircuitBreakerConfig::default());

            let response = orchestrator.transcribe(&audio(1)).await.unwrap();

            assert_eq!(response.provider_used(), stubs[healthy].name);
            for (i, stub) in stubs.iter().enumerate() {
                let expected = usize::from(i <= healthy);
                assert_eq!(stub.calls(), expected, "calls to {}", stub.name);
            }
        }
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_failure_in_order() {
        let a = Stub::new("a", Behaviour::Fail);
        let b = Stub::new("b", Behaviour::Fail);
        let orchestrator = stt(&[&a, &b], CircuitBreakerConfig::default());

        let err = orchestrator.transcribe(&audio(1)).await.unwrap_err();

        let OrchestratorError::AllProvidersExhausted { category, failures } = &err else {
            panic!("expected exhaustion, got {err:?}");
        };
        assert_eq!(*category, Category::Stt);
        let order: Vec<_> = failures.iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert!(failures.iter().all(|f| f.kind == FailureKind::Operation));
        assert!(failures[0].message.contains("a is down"));
    }

    #[tokio::test]
    async fn empty_chain_fails_fast() {
        let orchestrator = stt(&[], CircuitBreakerConfig::default());
        assert!(matches!(
            orchestrator.transcribe(&audio(1)).await,
            Err(OrchestratorError::NoProvidersConfigured(Category::Stt))
        ));

        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());
        orchestrator.set_provider_enabled("a", false).unwrap();
        assert!(matches!(
            orchestrator.transcribe(&audio(1)).await,
            Err(OrchestratorError::NoProvidersConfigured(Category::Stt))
        ));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_request_dispatches_nothing() {
        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        let empty = SttRequest::new(AudioData::new(vec![], AudioFormat::Wav));
        assert!(matches!(
            orchestrator.transcribe(&empty).await,
            Err(OrchestratorError::InvalidRequest(_))
        ));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn unsupported_format_skips_without_penalty() {
        let a = Stub::new("a", Behaviour::Succeed).with_formats(&[AudioFormat::Mp3]);
        let b = Stub::new("b", Behaviour::Succeed);
        let orchestrator = stt(&[&a, &b], CircuitBreakerConfig::default());

        let response = orchestrator.transcribe(&audio(1)).await.unwrap();

        assert_eq!(response.provider_used(), "b");
        assert_eq!(a.calls(), 0);
        assert_eq!(orchestrator.health_snapshot("a").status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn construction_failure_counts_against_provider() {
        let b = Stub::new("b", Behaviour::Succeed);
        let factory = ProviderFactory::new();
        factory
            .register(
                ProviderDescriptor::new(
                    "broken",
                    Category::Stt,
                    ProviderConstructor::from_fn(|_| {
                        Err(SpeechError::ConnectionFailed("no route".into()))
                    }),
                )
                .with_priority(1),
            )
            .unwrap();
        factory.register(b.descriptor(Category::Stt, 2)).unwrap();
        let orchestrator = start(factory, config(CircuitBreakerConfig::default()));

        let response = orchestrator.transcribe(&audio(1)).await.unwrap();

        assert_eq!(response.provider_used(), "b");
        assert_eq!(orchestrator.health_snapshot("broken").consecutive_failures, 1);
    }

    #[tokio::test]
    async fn tts_uses_provider_default_voice() {
        let a = Stub::new("a", Behaviour::Succeed);
        let factory = ProviderFactory::new();
        factory.register(a.descriptor(Category::Tts, 1)).unwrap();
        let orchestrator = start(factory, config(CircuitBreakerConfig::default()));

        let default = orchestrator
            .synthesize(&TtsRequest::new("Guten Morgen"))
            .await
            .unwrap();
        let chosen = orchestrator
            .synthesize(
                &TtsRequest::new("Guten Morgen")
                    .with_voice("nova")
                    .with_format(AudioFormat::Wav),
            )
            .await
            .unwrap();

        assert_eq!(default.voice(), "house");
        assert_eq!(default.audio().format(), AudioFormat::Mp3);
        assert_eq!(chosen.voice(), "nova");
        assert_eq!(chosen.audio().format(), AudioFormat::Wav);
        assert_eq!(a.calls(), 2);
    }
}

mod circuit_breaking {
    use super::*;

    #[tokio::test]
    async fn sixth_call_after_five_failures_fails_fast() {
        let a = Stub::new("a", Behaviour::Fail);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        for seed in 0..5 {
            let err = orchestrator.transcribe(&audio(seed)).await.unwrap_err();
            assert_eq!(err.failures()[0].kind, FailureKind::Operation);
        }
        let err = orchestrator.transcribe(&audio(5)).await.unwrap_err();

        assert_eq!(err.failures()[0].kind, FailureKind::CircuitOpen);
        assert_eq!(a.calls(), 5);
        let health = orchestrator.health_snapshot("a");
        assert_eq!(health.circuit, CircuitState::Open);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.consecutive_failures, 5);
    }

    #[tokio::test]
    async fn open_circuit_falls_through_then_recovers_with_a_trial() {
        let a = Stub::new("a", Behaviour::Fail);
        let b = Stub::new("b", Behaviour::Succeed);
        let orchestrator = stt(&[&a, &b], quick_breaker(2, 50));

        orchestrator.transcribe(&audio(1)).await.unwrap();
        orchestrator.transcribe(&audio(2)).await.unwrap();
        assert_eq!(orchestrator.health_snapshot("a").circuit, CircuitState::Open);

        let response = orchestrator.transcribe(&audio(3)).await.unwrap();
        assert_eq!(response.provider_used(), "b");
        assert_eq!(a.calls(), 2);

        a.set(Behaviour::Succeed);
        tokio::time::sleep(Duration::from_millis(80)).await;
        let response = orchestrator.transcribe(&audio(4)).await.unwrap();

        assert_eq!(response.provider_used(), "a");
        let health = orchestrator.health_snapshot("a");
        assert_eq!(health.circuit, CircuitState::Closed);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn failed_trial_reopens_the_circuit() {
        let a = Stub::new("a", Behaviour::Fail);
        let orchestrator = stt(&[&a], quick_breaker(1, 30));

        assert!(orchestrator.transcribe(&audio(1)).await.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(orchestrator.transcribe(&audio(2)).await.is_err());

        assert_eq!(a.calls(), 2);
        assert_eq!(orchestrator.health_snapshot("a").circuit, CircuitState::Open);
        let err = orchestrator.transcribe(&audio(3)).await.unwrap_err();
        assert_eq!(err.failures()[0].kind, FailureKind::CircuitOpen);
    }

    #[tokio::test]
    async fn only_one_trial_runs_while_half_open() {
        let a = Stub::new("a", Behaviour::Fail).with_delay(Duration::from_millis(100));
        let b = Stub::new("b", Behaviour::Succeed);
        let orchestrator = Arc::new(stt(&[&a, &b], quick_breaker(1, 20)));

        orchestrator.transcribe(&audio(0)).await.unwrap();
        assert_eq!(a.calls(), 1);
        a.set(Behaviour::Succeed);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let handles: Vec<_> = (1..=6)
            .map(|seed| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move { orchestrator.transcribe(&audio(seed)).await })
            })
            .collect();
        let mut served_by_a = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().provider_used() == "a" {
                served_by_a += 1;
            }
        }

        assert_eq!(a.calls(), 2);
        assert_eq!(served_by_a, 1);
        assert_eq!(orchestrator.health_snapshot("a").circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_closes_an_open_circuit() {
        let a = Stub::new("a", Behaviour::Fail);
        let orchestrator = stt(&[&a], quick_breaker(1, 60_000));

        assert!(orchestrator.transcribe(&audio(1)).await.is_err());
        a.set(Behaviour::Succeed);
        orchestrator.reset_provider("a").unwrap();

        let response = orchestrator.transcribe(&audio(2)).await.unwrap();
        assert_eq!(response.provider_used(), "a");
    }

    #[tokio::test]
    async fn success_reports_healthy_with_latency() {
        let a = Stub::new("a", Behaviour::Succeed).with_delay(Duration::from_millis(20));
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        orchestrator.transcribe(&audio(1)).await.unwrap();
        let snapshot = orchestrator.health_snapshot_all();

        assert_eq!(snapshot["a"].status, HealthStatus::Healthy);
        assert!(snapshot["a"].average_latency_ms >= 15.0);
        assert!(snapshot["a"].last_checked_at.is_some());
    }
}

mod timeouts_and_cancellation {
    use super::*;

    #[tokio::test]
    async fn timed_out_provider_falls_back_and_result_is_cached() {
        let a = Stub::new("a", Behaviour::Hang);
        let b = Stub::new("b", Behaviour::Succeed);
        let factory = ProviderFactory::new();
        factory
            .register(
                a.descriptor(Category::Stt, 1)
                    .with_dispatch_timeout(Duration::from_millis(30)),
            )
            .unwrap();
        factory.register(b.descriptor(Category::Stt, 2)).unwrap();
        let orchestrator = start(factory, config(CircuitBreakerConfig::default()));

        let response = orchestrator.transcribe(&audio(1)).await.unwrap();
        assert_eq!(response.provider_used(), "b");
        assert_eq!(orchestrator.health_snapshot("a").consecutive_failures, 1);

        let cached = orchestrator.transcribe(&audio(1)).await.unwrap();
        assert!(cached.cached());
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_failure_is_labelled() {
        let a = Stub::new("a", Behaviour::Hang);
        let factory = ProviderFactory::new();
        factory.register(a.descriptor(Category::Stt, 1)).unwrap();
        let orchestrator = start(
            factory,
            OrchestratorConfig {
                dispatch_timeout_ms: 25,
                ..config(CircuitBreakerConfig::default())
            },
        );

        let err = orchestrator.transcribe(&audio(1)).await.unwrap_err();
        assert_eq!(err.failures()[0].kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn stuck_construction_falls_back_to_next_provider() {
        let b = Stub::new("b", Behaviour::Succeed);
        let factory = ProviderFactory::new();
        factory
            .register(
                ProviderDescriptor::new(
                    "stuck",
                    Category::Stt,
                    ProviderConstructor::new(|_| {
                        std::future::pending::<Result<ProviderInstance, SpeechError>>()
                    }),
                )
                .with_priority(1)
                .with_dispatch_timeout(Duration::from_millis(30)),
            )
            .unwrap();
        factory.register(b.descriptor(Category::Stt, 2)).unwrap();
        let orchestrator = start(factory, config(CircuitBreakerConfig::default()));

        let response = tokio::time::timeout(
            Duration::from_secs(2),
            orchestrator.transcribe(&audio(1)),
        )
        .await
        .expect("construction must not block the chain")
        .unwrap();

        assert_eq!(response.provider_used(), "b");
        assert_eq!(b.calls(), 1);
        let health = orchestrator.health_snapshot("stuck");
        assert_eq!(health.consecutive_failures, 1);
        assert!(health.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn stuck_construction_is_labelled_as_construction() {
        let factory = ProviderFactory::new();
        factory
            .register(ProviderDescriptor::new(
                "stuck",
                Category::Stt,
                ProviderConstructor::new(|_| {
                    std::future::pending::<Result<ProviderInstance, SpeechError>>()
                }),
            ))
            .unwrap();
        let orchestrator = start(
            factory,
            OrchestratorConfig {
                dispatch_timeout_ms: 25,
                ..config(CircuitBreakerConfig::default())
            },
        );

        let err = orchestrator.transcribe(&audio(1)).await.unwrap_err();
        assert_eq!(err.failures()[0].kind, FailureKind::Construction);
    }

    #[tokio::test]
    async fn cancellation_records_nothing() {
        let a = Stub::new("a", Behaviour::Hang);
        let b = Stub::new("b", Behaviour::Succeed);
        let orchestrator = stt(&[&a, &b], CircuitBreakerConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = orchestrator
            .transcribe_with_cancel(&audio(1), &cancel)
            .await;

        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
        assert_eq!(b.calls(), 0);
        let health = orchestrator.health_snapshot("a");
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            orchestrator.transcribe_with_cancel(&audio(1), &cancel).await,
            Err(OrchestratorError::Cancelled)
        ));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_trial_is_released() {
        let a = Stub::new("a", Behaviour::Fail);
        let orchestrator = stt(&[&a], quick_breaker(1, 20));

        assert!(orchestrator.transcribe(&audio(1)).await.is_err());
        a.set(Behaviour::Hang);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert!(matches!(
            orchestrator.transcribe_with_cancel(&audio(2), &cancel).await,
            Err(OrchestratorError::Cancelled)
        ));

        a.set(Behaviour::Succeed);
        let response = orchestrator.transcribe(&audio(3)).await.unwrap();
        assert_eq!(response.provider_used(), "a");
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_identical_requests_agree() {
        let a = Stub::new("a", Behaviour::Succeed).with_delay(Duration::from_millis(10));
        let orchestrator = Arc::new(stt(&[&a], CircuitBreakerConfig::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move { orchestrator.transcribe(&audio(7)).await })
            })
            .collect();

        let mut texts = Vec::new();
        for handle in handles {
            texts.push(handle.await.unwrap().unwrap().text().to_string());
        }

        texts.dedup();
        assert_eq!(texts.len(), 1);
        assert!((1..=8).contains(&a.calls()));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_requests() {
        let a = Stub::new("a", Behaviour::Succeed);
        let orchestrator = stt(&[&a], CircuitBreakerConfig::default());

        orchestrator.shutdown().await;
        assert!(matches!(
            orchestrator.transcribe(&audio(1)).await,
            Err(OrchestratorError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn health_monitor_runs_between_initialize_and_shutdown() {
        let a = Stub::new("a", Behaviour::Succeed);
        let factory = ProviderFactory::new();
        factory.register(a.descriptor(Category::Stt, 1)).unwrap();
        let orchestrator = start(factory, OrchestratorConfig::default());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let health = orchestrator.health_snapshot("a");
        assert!(health.last_checked_at.is_some());
        assert_eq!(health.status, HealthStatus::Healthy);

        tokio::time::timeout(Duration::from_secs(1), orchestrator.shutdown())
            .await
            .expect("shutdown should join the monitor");
        assert_eq!(a.calls(), 0);
    }
}
