//! Background health monitor
//!
//! Periodically probes every provider's `health_check` and feeds the result
//! into the [`CircuitBreakerRegistry`]. Probes never open or close circuits.
//! With `disable_after_failures` set, a provider is taken out of the fallback
//! chain after that many consecutive failed probes and put back once a probe
//! succeeds (only if the monitor was the one that disabled it).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::HealthMonitorConfig;
use crate::factory::ProviderFactory;

/// Periodic provider prober
pub struct HealthMonitor {
    factory: Arc<ProviderFactory>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: HealthMonitorConfig,
    failed_probes: Mutex<HashMap<String, u32>>,
    auto_disabled: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("auto_disabled", &*self.auto_disabled.lock())
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Create a monitor over `factory`, reporting into `breakers`
    pub fn new(
        factory: Arc<ProviderFactory>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            factory,
            breakers,
            config,
            failed_probes: Mutex::new(HashMap::new()),
            auto_disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Providers disabled by the monitor
    #[must_use]
    pub fn auto_disabled(&self) -> Vec<String> {
        let mut names: Vec<_> = self.auto_disabled.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// Run the probe loop until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.config.interval_secs,
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {},
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = self.probe_all() => {},
                }
            }

            info!("Health monitor stopped");
        })
    }

    /// Probe every enabled or monitor-disabled provider once
    pub async fn probe_all(&self) -> BTreeMap<String, Result<(), String>> {
        let auto_disabled = self.auto_disabled.lock().clone();
        let names: Vec<String> = self
            .factory
            .names()
            .into_iter()
            .filter(|name| self.factory.is_enabled(name) || auto_disabled.contains(name))
            .collect();

        let results = join_all(names.iter().map(|name| self.probe(name))).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                self.apply(&name, &result);
                (name, result)
            })
            .collect()
    }

    async fn probe(&self, name: &str) -> Result<(), String> {
        let instance = self
            .factory
            .instance(name)
            .await
            .map_err(|e| e.to_string())?;

        match tokio::time::timeout(self.config.probe_timeout(), instance.health_check()).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "health probe timed out after {}ms",
                self.config.probe_timeout_ms
            )),
        }
    }

    fn apply(&self, name: &str, result: &Result<(), String>) {
        self.breakers.record_probe(name, result.clone());

        match result {
            Ok(()) => {
                self.failed_probes.lock().remove(name);
                if self.auto_disabled.lock().remove(name) {
                    if let Err(e) = self.factory.set_enabled(name, true) {
                        warn!(provider = %name, error = %e, "Failed to re-enable provider");
                    } else {
                        info!(provider = %name, "Provider recovered, re-enabled");
                    }
                }
            },
            Err(error) => {
                let failures = {
                    let mut failed = self.failed_probes.lock();
                    let count = failed.entry(name.to_string()).or_insert(0);
                    *count = count.saturating_add(1);
                    *count
                };
                debug!(provider = %name, failures, error = %error, "Health probe failed");

                let Some(limit) = self.config.disable_after_failures else {
                    return;
                };
                if failures >= limit && self.factory.is_enabled(name) {
                    match self.factory.set_enabled(name, false) {
                        Ok(_) => {
                            self.auto_disabled.lock().insert(name.to_string());
                            warn!(
                                provider = %name,
                                failures,
                                "Provider disabled after consecutive failed health probes"
                            );
                        },
                        Err(e) => warn!(provider = %name, error = %e, "Failed to disable provider"),
                    }
                }
            },
        }
    }
}
