//! Provider Factory
//!
//! Maps provider names to live capability providers. Descriptors are
//! registered once at bootstrap; instances are constructed lazily and cached
//! per `(name, config fingerprint)`, with a per-key `OnceCell` so concurrent
//! first use constructs exactly once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ai_speech::{Capabilities, SpeechError, SpeechToText, TextToSpeech};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::OrchestratorError;
use crate::model::Category;

/// Default priority for descriptors that do not set one
pub const DEFAULT_PRIORITY: u32 = 100;

/// Provider configuration (credentials, endpoints, model names)
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig(BTreeMap<String, String>);

impl ProviderConfig {
    /// Empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Fields from `required` that are absent or blank
    #[must_use]
    pub fn missing_fields<'a>(&self, required: &'a BTreeSet<String>) -> Vec<&'a str> {
        required
            .iter()
            .filter(|field| self.get(field).is_none_or(|value| value.trim().is_empty()))
            .map(String::as_str)
            .collect()
    }

    /// Stable hash over the sorted key/value pairs
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, value) in &self.0 {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no entries are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may be credentials.
        f.debug_map()
            .entries(self.0.keys().map(|key| (key, "[REDACTED]")))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProviderConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// A live capability provider
#[derive(Clone)]
pub enum ProviderInstance {
    /// Speech-to-text provider
    Stt(Arc<dyn SpeechToText>),
    /// Text-to-speech provider
    Tts(Arc<dyn TextToSpeech>),
}

impl ProviderInstance {
    /// Category the instance serves
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::Stt(_) => Category::Stt,
            Self::Tts(_) => Category::Tts,
        }
    }

    /// Declared capabilities
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        match self {
            Self::Stt(stt) => stt.capabilities(),
            Self::Tts(tts) => tts.capabilities(),
        }
    }

    /// Vendor model in use
    #[must_use]
    pub fn model_name(&self) -> &str {
        match self {
            Self::Stt(stt) => stt.model_name(),
            Self::Tts(tts) => tts.model_name(),
        }
    }

    /// Cheap liveness probe
    pub async fn health_check(&self) -> Result<(), SpeechError> {
        match self {
            Self::Stt(stt) => stt.health_check().await,
            Self::Tts(tts) => tts.health_check().await,
        }
    }
}

impl fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("category", &self.category())
            .field("model", &self.model_name())
            .finish()
    }
}

type ConstructFuture = BoxFuture<'static, Result<ProviderInstance, SpeechError>>;

/// Constructor registered for a provider name
#[derive(Clone)]
pub struct ProviderConstructor(Arc<dyn Fn(ProviderConfig) -> ConstructFuture + Send + Sync>);

impl ProviderConstructor {
    /// Wrap an async constructor
    pub fn new<F, Fut>(constructor: F) -> Self
    where
        F: Fn(ProviderConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProviderInstance, SpeechError>> + Send + 'static,
    {
        Self(Arc::new(move |config| constructor(config).boxed()))
    }

    /// Wrap a synchronous constructor
    pub fn from_fn<F>(constructor: F) -> Self
    where
        F: Fn(ProviderConfig) -> Result<ProviderInstance, SpeechError> + Send + Sync + 'static,
    {
        Self::new(move |config| std::future::ready(constructor(config)))
    }

    /// Run the constructor
    pub async fn construct(&self, config: ProviderConfig) -> Result<ProviderInstance, SpeechError> {
        (self.0)(config).await
    }
}

impl fmt::Debug for ProviderConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderConstructor")
    }
}

/// Static registration record
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Unique provider name
    pub name: String,
    /// Category the provider serves
    pub category: Category,
    /// Lower is tried first
    pub priority: u32,
    /// Disabled providers are left out of the fallback chain
    pub enabled: bool,
    /// Builds a live instance from configuration
    pub constructor: ProviderConstructor,
    /// Config fields that must be present and non-blank
    pub required_config_fields: BTreeSet<String>,
    /// Overrides the orchestrator's dispatch timeout
    pub dispatch_timeout: Option<Duration>,
}

impl ProviderDescriptor {
    /// Create an enabled descriptor with default priority
    pub fn new(name: impl Into<String>, category: Category, constructor: ProviderConstructor) -> Self {
        Self {
            name: name.into(),
            category,
            priority: DEFAULT_PRIORITY,
            enabled: true,
            constructor,
            required_config_fields: BTreeSet::new(),
            dispatch_timeout: None,
        }
    }

    /// Set the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the enabled flag
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the required config fields
    #[must_use]
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_config_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set a per-provider dispatch timeout
    #[must_use]
    pub const fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }
}

#[derive(Default)]
struct Registry {
    /// Registration order
    descriptors: Vec<ProviderDescriptor>,
    configs: HashMap<String, ProviderConfig>,
}

impl Registry {
    fn find(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ProviderDescriptor> {
        self.descriptors.iter_mut().find(|d| d.name == name)
    }
}

type InstanceKey = (String, String);

/// Registry of provider descriptors and cache of live instances
#[derive(Default)]
pub struct ProviderFactory {
    registry: RwLock<Registry>,
    instances: Mutex<HashMap<InstanceKey, Arc<OnceCell<ProviderInstance>>>>,
}

impl fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("providers", &self.names())
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}

impl ProviderFactory {
    /// Empty factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor
    ///
    /// A replacement keeps the original registration position and drops
    /// cached instances built from the old descriptor.
    pub fn register(&self, descriptor: ProviderDescriptor) -> Result<(), OrchestratorError> {
        if descriptor.name.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "provider name must not be empty".to_string(),
            ));
        }

        let name = descriptor.name.clone();
        {
            let mut registry = self.registry.write();
            match registry.find_mut(&name) {
                Some(existing) if existing.category != descriptor.category => {
                    return Err(OrchestratorError::DuplicateProvider {
                        name,
                        existing: existing.category,
                    });
                },
                Some(existing) => {
                    info!(provider = %name, "Replacing provider registration");
                    *existing = descriptor;
                },
                None => {
                    info!(
                        provider = %name,
                        category = %descriptor.category,
                        priority = descriptor.priority,
                        "Registered provider"
                    );
                    registry.descriptors.push(descriptor);
                },
            }
        }
        self.evict(&name);
        Ok(())
    }

    /// Build (or reuse) an instance of `name` for `config`
    #[instrument(skip(self, config), level = "debug")]
    pub async fn create(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<ProviderInstance, OrchestratorError> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| OrchestratorError::UnknownProvider(name.to_string()))?;

        let missing = config.missing_fields(&descriptor.required_config_fields);
        if !missing.is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "provider '{name}' is missing required config fields: {}",
                missing.join(", ")
            )));
        }

        let cell = {
            let mut instances = self.instances.lock();
            Arc::clone(
                instances
                    .entry((name.to_string(), config.fingerprint()))
                    .or_default(),
            )
        };

        let instance = cell
            .get_or_try_init(|| async {
                debug!(provider = %name, "Constructing provider instance");
                let instance = descriptor
                    .constructor
                    .construct(config.clone())
                    .await
                    .map_err(|e| match e {
                        SpeechError::Configuration(msg) => OrchestratorError::Configuration(
                            format!("provider '{name}': {msg}"),
                        ),
                        other => OrchestratorError::ProviderUnavailable {
                            provider: name.to_string(),
                            reason: format!("construction failed: {other}"),
                        },
                    })?;
                check_compliance(name, descriptor.category, &instance)?;
                Ok::<_, OrchestratorError>(instance)
            })
            .await?;

        Ok(instance.clone())
    }

    /// Store the bootstrap configuration for `name`
    pub fn configure(&self, name: &str, config: ProviderConfig) -> Result<(), OrchestratorError> {
        {
            let mut registry = self.registry.write();
            if registry.find(name).is_none() {
                return Err(OrchestratorError::UnknownProvider(name.to_string()));
            }
            registry.configs.insert(name.to_string(), config);
        }
        self.evict(name);
        Ok(())
    }

    /// Stored configuration for `name`
    #[must_use]
    pub fn config_for(&self, name: &str) -> Option<ProviderConfig> {
        self.registry.read().configs.get(name).cloned()
    }

    /// Instance of `name` built from its stored configuration
    pub async fn instance(&self, name: &str) -> Result<ProviderInstance, OrchestratorError> {
        let config = self.config_for(name).unwrap_or_default();
        self.create(name, &config).await
    }

    /// Descriptors for `category`, ascending by priority
    ///
    /// Ties keep registration order.
    #[must_use]
    pub fn list_available(&self, category: Category, enabled_only: bool) -> Vec<ProviderDescriptor> {
        let mut descriptors: Vec<_> = self
            .registry
            .read()
            .descriptors
            .iter()
            .filter(|d| d.category == category && (d.enabled || !enabled_only))
            .cloned()
            .collect();
        descriptors.sort_by_key(|d| d.priority);
        descriptors
    }

    /// Names of enabled providers for `category` in fallback order
    #[must_use]
    pub fn priority_chain(&self, category: Category) -> Vec<String> {
        self.list_available(category, true)
            .into_iter()
            .map(|d| d.name)
            .collect()
    }

    /// Toggle the enabled flag, returning the previous value
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, OrchestratorError> {
        let mut registry = self.registry.write();
        let descriptor = registry
            .find_mut(name)
            .ok_or_else(|| OrchestratorError::UnknownProvider(name.to_string()))?;
        let previous = std::mem::replace(&mut descriptor.enabled, enabled);
        if previous != enabled {
            info!(provider = %name, enabled, "Provider enabled flag changed");
        }
        Ok(previous)
    }

    /// Whether `name` is registered and enabled
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.registry.read().find(name).is_some_and(|d| d.enabled)
    }

    /// Descriptor for `name`
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<ProviderDescriptor> {
        self.registry.read().find(name).cloned()
    }

    /// All registered names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.registry
            .read()
            .descriptors
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    /// Check that every enabled provider has its required config fields
    pub fn validate_configured(&self) -> Result<(), OrchestratorError> {
        let registry = self.registry.read();
        let empty = ProviderConfig::default();
        let problems: Vec<String> = registry
            .descriptors
            .iter()
            .filter(|d| d.enabled)
            .filter_map(|d| {
                let config = registry.configs.get(&d.name).unwrap_or(&empty);
                let missing = config.missing_fields(&d.required_config_fields);
                (!missing.is_empty())
                    .then(|| format!("provider '{}' is missing {}", d.name, missing.join(", ")))
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::Configuration(problems.join("; ")))
        }
    }

    /// Drop cached instances of `name`, returning how many were removed
    pub fn evict(&self, name: &str) -> usize {
        let mut instances = self.instances.lock();
        let before = instances.len();
        instances.retain(|(cached, _), _| cached != name);
        let removed = before - instances.len();
        if removed > 0 {
            debug!(provider = %name, removed, "Evicted cached provider instances");
        }
        removed
    }
}

fn check_compliance(
    name: &str,
    category: Category,
    instance: &ProviderInstance,
) -> Result<(), OrchestratorError> {
    let violation = |reason: String| {
        warn!(provider = %name, reason = %reason, "Provider failed compliance check");
        OrchestratorError::InterfaceCompliance {
            provider: name.to_string(),
            reason,
        }
    };

    if instance.category() != category {
        return Err(violation(format!(
            "registered as {category} but implements {}",
            instance.category()
        )));
    }
    if instance.capabilities().formats.is_empty() {
        return Err(violation("capabilities declare no audio formats".to_string()));
    }
    if instance.model_name().trim().is_empty() {
        return Err(violation("model name is empty".to_string()));
    }
    Ok(())
}
