//! Circuit Breaker Registry
//!
//! Per-provider circuit breakers and the single writer of [`ProviderHealth`].
//!
//! # States
//!
//! - **Closed**: dispatch allowed
//! - **Open**: dispatch denied until `recovery_timeout_ms` has elapsed
//! - **Half-Open**: exactly one trial dispatch allowed; its outcome closes or
//!   reopens the circuit
//!
//! The trial permit is an `AtomicBool` claimed by compare-and-swap, so
//! concurrent callers never share a half-open trial. Callers that lose the
//! race are denied immediately instead of waiting on the trial.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{CircuitState, HealthStatus, ProviderHealth};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open circuit waits before allowing a trial
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Failure share of recent outcomes that marks a provider degraded
    #[serde(default = "default_degraded_failure_ratio")]
    pub degraded_failure_ratio: f64,

    /// Number of recent dispatch outcomes considered for the ratio
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,

    /// Outcomes required before the ratio is evaluated
    #[serde(default = "default_degraded_min_samples")]
    pub degraded_min_samples: usize,

    /// Number of recent successful latencies in the rolling mean
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout_ms() -> u64 {
    300_000 // 5 minutes
}

const fn default_degraded_failure_ratio() -> f64 {
    0.5
}

const fn default_outcome_window() -> usize {
    20
}

const fn default_degraded_min_samples() -> usize {
    4
}

const fn default_latency_window() -> usize {
    20
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            degraded_failure_ratio: default_degraded_failure_ratio(),
            outcome_window: default_outcome_window(),
            degraded_min_samples: default_degraded_min_samples(),
            latency_window: default_latency_window(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Recovery timeout as a `Duration`
    #[must_use]
    pub const fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error message if a value is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be at least 1".to_string());
        }
        if !(self.degraded_failure_ratio > 0.0 && self.degraded_failure_ratio <= 1.0) {
            return Err("degraded_failure_ratio must be in (0.0, 1.0]".to_string());
        }
        if self.outcome_window == 0 || self.latency_window == 0 {
            return Err("outcome_window and latency_window must be at least 1".to_string());
        }
        if self.degraded_min_samples > self.outcome_window {
            return Err("degraded_min_samples must not exceed outcome_window".to_string());
        }
        Ok(())
    }
}

/// Result of asking whether a provider may be dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed
    Granted,
    /// Caller holds the single half-open trial permit
    Trial,
    /// Circuit open, or the trial is already taken
    Denied,
}

impl Admission {
    /// Whether dispatch may proceed
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

#[derive(Debug)]
struct BreakerState {
    circuit: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// `true` for success, newest last
    outcomes: VecDeque<bool>,
    latencies_ms: VecDeque<f64>,
    ever_succeeded: bool,
    last_error: Option<String>,
    last_checked_at: Option<DateTime<Utc>>,
    last_probe_ok: Option<bool>,
}

impl BreakerState {
    const fn new() -> Self {
        Self {
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            outcomes: VecDeque::new(),
            latencies_ms: VecDeque::new(),
            ever_succeeded: false,
            last_error: None,
            last_checked_at: None,
            last_probe_ok: None,
        }
    }

    fn recovery_elapsed(&self, recovery: Duration) -> bool {
        self.opened_at.is_none_or(|at| at.elapsed() >= recovery)
    }

    fn push_outcome(&mut self, success: bool, window: usize) {
        if self.outcomes.len() >= window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    #[allow(clippy::cast_precision_loss)]
    fn failure_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn average_latency_ms(&self) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }
        self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
    }

    fn status(&self, circuit: CircuitState, config: &CircuitBreakerConfig) -> HealthStatus {
        if circuit != CircuitState::Closed {
            return HealthStatus::Unhealthy;
        }
        let ratio_exceeded = self.outcomes.len() >= config.degraded_min_samples
            && self.failure_ratio() >= config.degraded_failure_ratio;
        let failing_since_start = !self.ever_succeeded && self.consecutive_failures > 0;

        if ratio_exceeded || failing_since_start || self.last_probe_ok == Some(false) {
            HealthStatus::Degraded
        } else if self.ever_succeeded || self.last_probe_ok == Some(true) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }
}

#[derive(Debug)]
struct Entry {
    state: Mutex<BreakerState>,
    trial_in_flight: AtomicBool,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: Mutex::new(BreakerState::new()),
            trial_in_flight: AtomicBool::new(false),
        }
    }

    fn release_trial(&self) {
        self.trial_in_flight.store(false, Ordering::Release);
    }
}

/// Per-provider circuit breakers
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config)
            .field("providers", &self.entries.read().len())
            .finish()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn entry(&self, name: &str) -> Arc<Entry> {
        if let Some(entry) = self.entries.read().get(name) {
            return Arc::clone(entry);
        }
        Arc::clone(
            self.entries
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Entry::new())),
        )
    }

    fn existing(&self, name: &str) -> Option<Arc<Entry>> {
        self.entries.read().get(name).map(Arc::clone)
    }

    /// Decide whether `name` may be dispatched to
    ///
    /// A [`Admission::Trial`] result must be followed by `record_success`,
    /// `record_failure` or `abandon_trial`.
    pub fn admit(&self, name: &str) -> Admission {
        let entry = self.entry(name);
        let mut state = entry.state.lock();

        if state.circuit == CircuitState::Open {
            if !state.recovery_elapsed(self.config.recovery_timeout()) {
                return Admission::Denied;
            }
            info!(provider = %name, "Circuit transitioning from Open to HalfOpen");
            state.circuit = CircuitState::HalfOpen;
        }

        match state.circuit {
            CircuitState::Closed => Admission::Granted,
            CircuitState::HalfOpen => {
                if entry
                    .trial_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    debug!(provider = %name, "Granted half-open trial dispatch");
                    Admission::Trial
                } else {
                    Admission::Denied
                }
            },
            CircuitState::Open => Admission::Denied,
        }
    }

    /// Whether `name` may be dispatched to
    ///
    /// Claims the half-open trial when one is available.
    pub fn allow(&self, name: &str) -> bool {
        self.admit(name).is_allowed()
    }

    /// Record a successful dispatch admitted with `admission`
    ///
    /// Only the holder of the half-open trial closes the circuit; late
    /// results from earlier dispatches just update the counters.
    pub fn record_success(&self, name: &str, admission: Admission, latency_ms: u64) {
        let entry = self.entry(name);
        let mut state = entry.state.lock();

        state.consecutive_failures = 0;
        state.ever_succeeded = true;
        state.last_checked_at = Some(Utc::now());
        if state.last_probe_ok == Some(false) {
            state.last_probe_ok = None;
        }
        state.push_outcome(true, self.config.outcome_window);
        if state.latencies_ms.len() >= self.config.latency_window {
            state.latencies_ms.pop_front();
        }
        #[allow(clippy::cast_precision_loss)]
        let latency = latency_ms as f64;
        state.latencies_ms.push_back(latency);

        if state.circuit == CircuitState::HalfOpen && admission == Admission::Trial {
            info!(provider = %name, "Circuit transitioning from HalfOpen to Closed");
            state.circuit = CircuitState::Closed;
            state.opened_at = None;
            entry.release_trial();
        }
    }

    /// Record a failed dispatch admitted with `admission`
    ///
    /// While half-open only the trial holder reopens the circuit.
    pub fn record_failure(&self, name: &str, admission: Admission, error: &str) {
        let entry = self.entry(name);
        let mut state = entry.state.lock();

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(error.to_string());
        state.last_checked_at = Some(Utc::now());
        state.push_outcome(false, self.config.outcome_window);

        match state.circuit {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        provider = %name,
                        failures = state.consecutive_failures,
                        error = %error,
                        "Circuit transitioning from Closed to Open"
                    );
                    state.circuit = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            },
            CircuitState::HalfOpen if admission == Admission::Trial => {
                warn!(
                    provider = %name,
                    error = %error,
                    "Circuit transitioning from HalfOpen to Open after failure"
                );
                state.circuit = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                entry.release_trial();
            },
            CircuitState::HalfOpen | CircuitState::Open => {},
        }
    }

    /// Release a half-open trial without recording an outcome
    ///
    /// Used when the trial dispatch was cancelled by the caller.
    pub fn abandon_trial(&self, name: &str) {
        if let Some(entry) = self.existing(name) {
            if entry.trial_in_flight.swap(false, Ordering::AcqRel) {
                debug!(provider = %name, "Half-open trial abandoned");
            }
        }
    }

    /// Record a health probe result
    ///
    /// Probes update status and diagnostics but never open or close the circuit.
    pub fn record_probe(&self, name: &str, result: Result<(), String>) {
        let entry = self.entry(name);
        let mut state = entry.state.lock();
        state.last_checked_at = Some(Utc::now());
        match result {
            Ok(()) => state.last_probe_ok = Some(true),
            Err(error) => {
                debug!(provider = %name, error = %error, "Health probe failed");
                state.last_probe_ok = Some(false);
                state.last_error = Some(error);
            },
        }
    }

    /// Force the circuit closed and clear failure history
    pub fn reset(&self, name: &str) {
        let entry = self.entry(name);
        *entry.state.lock() = BreakerState::new();
        entry.release_trial();
        info!(provider = %name, "Circuit breaker reset");
    }

    /// Current health of `name`
    #[must_use]
    pub fn health_snapshot(&self, name: &str) -> ProviderHealth {
        self.existing(name)
            .map_or_else(ProviderHealth::unknown, |entry| self.snapshot(&entry))
    }

    /// Health of every provider the registry has seen
    #[must_use]
    pub fn health_snapshot_all(&self) -> BTreeMap<String, ProviderHealth> {
        let entries: Vec<(String, Arc<Entry>)> = self
            .entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();
        entries
            .into_iter()
            .map(|(name, entry)| {
                let health = self.snapshot(&entry);
                (name, health)
            })
            .collect()
    }

    fn snapshot(&self, entry: &Entry) -> ProviderHealth {
        let state = entry.state.lock();
        let circuit = match state.circuit {
            CircuitState::Open if state.recovery_elapsed(self.config.recovery_timeout()) => {
                CircuitState::HalfOpen
            },
            other => other,
        };
        ProviderHealth {
            status: state.status(circuit, &self.config),
            circuit,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
            average_latency_ms: state.average_latency_ms(),
            last_checked_at: state.last_checked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn registry(threshold: u32, recovery_ms: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery_ms,
            ..CircuitBreakerConfig::default()
        })
    }

    fn trip(registry: &CircuitBreakerRegistry, name: &str) {
        for _ in 0..registry.config().failure_threshold {
            let admission = registry.admit(name);
            assert!(admission.is_allowed());
            registry.record_failure(name, admission, "boom");
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn defaults() {
            let config = CircuitBreakerConfig::default();
            assert_eq!(config.failure_threshold, 5);
            assert_eq!(config.recovery_timeout(), Duration::from_secs(300));
            assert!(config.validate().is_ok());
        }

        #[test]
        fn partial_toml_uses_defaults() {
            let config: CircuitBreakerConfig =
                toml::from_str("failure_threshold = 3\ndegraded_failure_ratio = 0.3").unwrap();
            assert_eq!(config.failure_threshold, 3);
            assert!((config.degraded_failure_ratio - 0.3).abs() < f64::EPSILON);
            assert_eq!(config.outcome_window, 20);
        }

        #[test]
        fn rejects_out_of_range_values() {
            let zero_threshold = CircuitBreakerConfig {
                failure_threshold: 0,
                ..CircuitBreakerConfig::default()
            };
            let bad_ratio = CircuitBreakerConfig {
                degraded_failure_ratio: 1.5,
                ..CircuitBreakerConfig::default()
            };
            let too_many_samples = CircuitBreakerConfig {
                degraded_min_samples: 50,
                ..CircuitBreakerConfig::default()
            };
            assert!(zero_threshold.validate().is_err());
            assert!(bad_ratio.validate().is_err());
            assert!(too_many_samples.validate().is_err());
        }
    }

    mod state_machine_tests {
        use super::*;

        #[test]
        fn opens_after_threshold_consecutive_failures() {
            let registry = registry(5, 60_000);
            for _ in 0..4 {
                registry.record_failure("a", Admission::Granted, "boom");
            }
            assert!(registry.allow("a"));

            registry.record_failure("a", Admission::Granted, "boom");
            assert_eq!(registry.admit("a"), Admission::Denied);

            let health = registry.health_snapshot("a");
            assert_eq!(health.circuit, CircuitState::Open);
            assert_eq!(health.status, HealthStatus::Unhealthy);
            assert_eq!(health.consecutive_failures, 5);
            assert_eq!(health.last_error.as_deref(), Some("boom"));
        }

        #[test]
        fn success_resets_consecutive_failures() {
            let registry = registry(3, 60_000);
            registry.record_failure("a", Admission::Granted, "x");
            registry.record_failure("a", Admission::Granted, "x");
            registry.record_success("a", Admission::Granted, 10);
            registry.record_failure("a", Admission::Granted, "x");
            registry.record_failure("a", Admission::Granted, "x");

            assert!(registry.allow("a"));
            assert_eq!(registry.health_snapshot("a").consecutive_failures, 2);
        }

        #[test]
        fn single_trial_after_recovery_timeout() {
            let registry = registry(2, 20);
            trip(&registry, "a");
            assert_eq!(registry.admit("a"), Admission::Denied);

            std::thread::sleep(Duration::from_millis(30));
            assert_eq!(registry.health_snapshot("a").circuit, CircuitState::HalfOpen);
            assert_eq!(registry.admit("a"), Admission::Trial);
            assert_eq!(registry.admit("a"), Admission::Denied);

            registry.record_success("a", Admission::Trial, 5);
            assert_eq!(registry.admit("a"), Admission::Granted);
            assert_eq!(registry.health_snapshot("a").status, HealthStatus::Healthy);
        }

        #[test]
        fn failed_trial_reopens_for_a_full_timeout() {
            let registry = registry(1, 30);
            trip(&registry, "a");
            std::thread::sleep(Duration::from_millis(40));

            assert_eq!(registry.admit("a"), Admission::Trial);
            registry.record_failure("a", Admission::Trial, "still down");
            assert_eq!(registry.admit("a"), Admission::Denied);
            assert_eq!(registry.health_snapshot("a").circuit, CircuitState::Open);
        }

        #[test]
        fn abandoned_trial_frees_the_permit_without_recording() {
            let registry = registry(1, 0);
            trip(&registry, "a");

            assert_eq!(registry.admit("a"), Admission::Trial);
            registry.abandon_trial("a");

            let health = registry.health_snapshot("a");
            assert_eq!(health.consecutive_failures, 1);
            assert_eq!(registry.admit("a"), Admission::Trial);
        }

        #[test]
        fn late_success_does_not_close_an_open_circuit() {
            let registry = registry(1, 60_000);
            trip(&registry, "a");
            registry.record_success("a", Admission::Granted, 10);
            assert_eq!(registry.admit("a"), Admission::Denied);
        }

        #[test]
        fn late_failure_does_not_steal_the_trial() {
            let registry = registry(1, 0);
            let early = registry.admit("a");
            assert_eq!(early, Admission::Granted);
            registry.record_failure("a", Admission::Granted, "boom");

            assert_eq!(registry.admit("a"), Admission::Trial);
            registry.record_failure("a", early, "late");

            assert_eq!(registry.admit("a"), Admission::Denied);
            let health = registry.health_snapshot("a");
            assert_eq!(health.circuit, CircuitState::HalfOpen);
            assert_eq!(health.consecutive_failures, 2);
            assert_eq!(health.last_error.as_deref(), Some("late"));
        }

        #[test]
        fn late_success_does_not_close_under_a_running_trial() {
            let registry = registry(1, 0);
            let early = registry.admit("a");
            registry.record_failure("a", Admission::Granted, "boom");

            assert_eq!(registry.admit("a"), Admission::Trial);
            registry.record_success("a", early, 10);
            assert_eq!(registry.health_snapshot("a").circuit, CircuitState::HalfOpen);
            assert_eq!(registry.admit("a"), Admission::Denied);

            registry.record_success("a", Admission::Trial, 10);
            assert_eq!(registry.health_snapshot("a").circuit, CircuitState::Closed);
            assert_eq!(registry.admit("a"), Admission::Granted);
        }

        #[test]
        fn concurrent_callers_share_one_trial() {
            let registry = Arc::new(registry(1, 0));
            trip(&registry, "a");

            let threads = 16;
            let barrier = Arc::new(Barrier::new(threads));
            let trials = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let barrier = Arc::clone(&barrier);
                    let trials = Arc::clone(&trials);
                    std::thread::spawn(move || {
                        barrier.wait();
                        if registry.admit("a") == Admission::Trial {
                            trials.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(trials.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn reset_closes_and_clears() {
            let registry = registry(1, 60_000);
            trip(&registry, "a");
            registry.reset("a");

            assert_eq!(registry.admit("a"), Admission::Granted);
            let health = registry.health_snapshot("a");
            assert_eq!(health.consecutive_failures, 0);
            assert_eq!(health.status, HealthStatus::Unknown);
        }

        #[test]
        fn providers_are_isolated() {
            let registry = registry(1, 60_000);
            trip(&registry, "a");
            assert_eq!(registry.admit("b"), Admission::Granted);
        }
    }

    mod health_tests {
        use super::*;

        #[test]
        fn unseen_provider_is_unknown() {
            let registry = CircuitBreakerRegistry::default();
            assert_eq!(registry.health_snapshot("ghost"), ProviderHealth::unknown());
            assert!(registry.health_snapshot_all().is_empty());
        }

        #[test]
        fn first_success_makes_healthy() {
            let registry = CircuitBreakerRegistry::default();
            registry.record_success("a", Admission::Granted, 100);
            let health = registry.health_snapshot("a");
            assert_eq!(health.status, HealthStatus::Healthy);
            assert!(health.last_checked_at.is_some());
        }

        #[test]
        fn failure_ratio_marks_degraded() {
            let registry = CircuitBreakerRegistry::default();
            // success, failure, success, failure: 50% over 4 samples
            for ok in [true, false, true, false] {
                if ok {
                    registry.record_success("a", Admission::Granted, 10);
                } else {
                    registry.record_failure("a", Admission::Granted, "flaky");
                }
            }
            assert_eq!(registry.health_snapshot("a").status, HealthStatus::Degraded);

            for _ in 0..6 {
                registry.record_success("a", Admission::Granted, 10);
            }
            assert_eq!(registry.health_snapshot("a").status, HealthStatus::Healthy);
        }

        #[test]
        fn ratio_needs_minimum_samples() {
            let registry = CircuitBreakerRegistry::default();
            registry.record_success("a", Admission::Granted, 10);
            registry.record_failure("a", Admission::Granted, "once");
            assert_eq!(registry.health_snapshot("a").status, HealthStatus::Healthy);
        }

        #[test]
        fn average_latency_is_a_rolling_mean() {
            let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
                latency_window: 2,
                ..CircuitBreakerConfig::default()
            });
            registry.record_success("a", Admission::Granted, 100);
            registry.record_success("a", Admission::Granted, 200);
            registry.record_success("a", Admission::Granted, 400);

            let average = registry.health_snapshot("a").average_latency_ms;
            assert!((average - 300.0).abs() < f64::EPSILON);
        }

        #[test]
        fn probes_never_touch_the_circuit() {
            let registry = registry(1, 60_000);
            registry.record_probe("a", Err("unreachable".into()));
            let health = registry.health_snapshot("a");
            assert_eq!(health.circuit, CircuitState::Closed);
            assert_eq!(health.status, HealthStatus::Degraded);
            assert_eq!(health.consecutive_failures, 0);

            registry.record_probe("a", Ok(()));
            assert_eq!(registry.health_snapshot("a").status, HealthStatus::Healthy);

            trip(&registry, "a");
            registry.record_probe("a", Ok(()));
            assert_eq!(registry.admit("a"), Admission::Denied);
        }
    }
}
