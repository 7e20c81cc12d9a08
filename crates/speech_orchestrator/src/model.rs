//! Requests, responses, cache keys and health records
//!
//! Requests are immutable values. Their cache key depends only on semantic
//! content (payload, language, quality, category and for TTS the voice and
//! output format), never on time or randomness, so identical requests always
//! map to the same cache entry.

use std::fmt;
use std::sync::OnceLock;

use ai_speech::{
    AudioData, AudioFormat, Capabilities, QualityTier, SpeechError, SynthesisOptions,
    Transcription, TranscriptionOptions,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::factory::ProviderInstance;

/// Provider category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Speech-to-text
    Stt,
    /// Text-to-speech
    Tts,
}

impl Category {
    /// Key namespace in the result cache
    #[must_use]
    pub const fn cache_namespace(self) -> &'static str {
        match self {
            Self::Stt => "stt",
            Self::Tts => "tts",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_namespace())
    }
}

/// Caller's provider preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOverride {
    /// Provider to try first
    pub name: String,
    /// When set, no fallback happens and failure is final
    pub strict: bool,
}

impl ProviderOverride {
    /// Try `name` first, fall back to the rest of the chain
    #[must_use]
    pub fn preferred(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strict: false,
        }
    }

    /// Use only `name`
    #[must_use]
    pub fn strict(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strict: true,
        }
    }
}

/// Deterministic result-cache key: `"{stt|tts}:{blake3 hex}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    fn derive(category: Category, parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(category.cache_namespace().as_bytes());
        for part in parts {
            // Length-prefixed so component boundaries cannot shift.
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(format!(
            "{}:{}",
            category.cache_namespace(),
            hasher.finalize().to_hex()
        ))
    }

    /// Key as stored in the cache backend
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_language(language: &str) -> Option<String> {
    let trimmed = language.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn opt_bytes(value: Option<&str>) -> &[u8] {
    value.map_or(&[], str::as_bytes)
}

/// Speech-to-text request
#[derive(Debug, Clone)]
pub struct SttRequest {
    audio: AudioData,
    language: Option<String>,
    quality: QualityTier,
    provider_override: Option<ProviderOverride>,
    cache_key: OnceLock<CacheKey>,
}

impl SttRequest {
    /// Create a request for `audio`
    #[must_use]
    pub const fn new(audio: AudioData) -> Self {
        Self {
            audio,
            language: None,
            quality: QualityTier::Standard,
            provider_override: None,
            cache_key: OnceLock::new(),
        }
    }

    /// Set the language hint (normalized to lowercase)
    #[must_use]
    pub fn with_language(self, language: &str) -> Self {
        Self {
            language: normalize_language(language),
            cache_key: OnceLock::new(),
            ..self
        }
    }

    /// Set the quality tier
    #[must_use]
    pub fn with_quality(self, quality: QualityTier) -> Self {
        Self {
            quality,
            cache_key: OnceLock::new(),
            ..self
        }
    }

    /// Set a provider preference
    #[must_use]
    pub fn with_provider(mut self, provider_override: ProviderOverride) -> Self {
        self.provider_override = Some(provider_override);
        self
    }

    /// Audio to transcribe
    #[must_use]
    pub const fn audio(&self) -> &AudioData {
        &self.audio
    }

    /// Normalized language hint
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Requested quality tier
    #[must_use]
    pub const fn quality(&self) -> QualityTier {
        self.quality
    }

    /// Options handed to the provider
    #[must_use]
    pub fn options(&self) -> TranscriptionOptions {
        TranscriptionOptions {
            language: self.language.clone(),
            quality: self.quality,
        }
    }
}

/// Text-to-speech request
#[derive(Debug, Clone)]
pub struct TtsRequest {
    text: String,
    language: Option<String>,
    voice: Option<String>,
    format: Option<AudioFormat>,
    quality: QualityTier,
    provider_override: Option<ProviderOverride>,
    cache_key: OnceLock<CacheKey>,
}

impl TtsRequest {
    /// Create a request for `text`
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            voice: None,
            format: None,
            quality: QualityTier::Standard,
            provider_override: None,
            cache_key: OnceLock::new(),
        }
    }

    /// Set the language (normalized to lowercase)
    #[must_use]
    pub fn with_language(self, language: &str) -> Self {
        Self {
            language: normalize_language(language),
            cache_key: OnceLock::new(),
            ..self
        }
    }

    /// Set the voice
    #[must_use]
    pub fn with_voice(self, voice: impl Into<String>) -> Self {
        Self {
            voice: Some(voice.into()),
            cache_key: OnceLock::new(),
            ..self
        }
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(self, format: AudioFormat) -> Self {
        Self {
            format: Some(format),
            cache_key: OnceLock::new(),
            ..self
        }
    }

    /// Set the quality tier
    #[must_use]
    pub fn with_quality(self, quality: QualityTier) -> Self {
        Self {
            quality,
            cache_key: OnceLock::new(),
            ..self
        }
    }

    /// Set a provider preference
    #[must_use]
    pub fn with_provider(mut self, provider_override: ProviderOverride) -> Self {
        self.provider_override = Some(provider_override);
        self
    }

    /// Text to synthesize
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Normalized language
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Requested voice
    #[must_use]
    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    /// Requested output format
    #[must_use]
    pub const fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// Requested quality tier
    #[must_use]
    pub const fn quality(&self) -> QualityTier {
        self.quality
    }

    /// Options handed to the provider
    #[must_use]
    pub fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            voice: self.voice.clone(),
            format: self.format,
            language: self.language.clone(),
            quality: self.quality,
        }
    }
}

/// Speech-to-text result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttResponse {
    text: String,
    language: Option<String>,
    confidence: Option<f32>,
    duration_ms: Option<u64>,
    provider_used: String,
    processing_time_ms: u64,
    cached: bool,
}

impl SttResponse {
    pub(crate) fn from_transcription(
        transcription: Transcription,
        provider_used: &str,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            text: transcription.text,
            language: transcription.language,
            confidence: transcription.confidence,
            duration_ms: transcription.duration_ms,
            provider_used: provider_used.to_string(),
            processing_time_ms,
            cached: false,
        }
    }

    /// Transcribed text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Detected or hinted language
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Vendor confidence score
    #[must_use]
    pub const fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// Audio duration reported by the vendor
    #[must_use]
    pub const fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Provider that produced the result
    #[must_use]
    pub fn provider_used(&self) -> &str {
        &self.provider_used
    }

    /// Time spent serving this request
    #[must_use]
    pub const fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    /// Whether the result came from the cache
    #[must_use]
    pub const fn cached(&self) -> bool {
        self.cached
    }
}

/// Text-to-speech result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsResponse {
    audio: AudioData,
    voice: String,
    provider_used: String,
    processing_time_ms: u64,
    cached: bool,
}

impl TtsResponse {
    /// Synthesized audio
    #[must_use]
    pub const fn audio(&self) -> &AudioData {
        &self.audio
    }

    /// Consume and return the audio
    #[must_use]
    pub fn into_audio(self) -> AudioData {
        self.audio
    }

    /// Voice that was used
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Provider that produced the result
    #[must_use]
    pub fn provider_used(&self) -> &str {
        &self.provider_used
    }

    /// Time spent serving this request
    #[must_use]
    pub const fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    /// Whether the result came from the cache
    #[must_use]
    pub const fn cached(&self) -> bool {
        self.cached
    }
}

/// Coarse provider health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Recent dispatches succeed
    Healthy,
    /// A notable share of recent dispatches fail
    Degraded,
    /// Circuit is open
    Unhealthy,
    /// No evidence yet
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, dispatch allowed
    Closed,
    /// Provider is failing, dispatch forbidden
    Open,
    /// One trial dispatch allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time health of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Coarse status
    pub status: HealthStatus,
    /// Circuit breaker state
    pub circuit: CircuitState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Most recent failure reason
    pub last_error: Option<String>,
    /// Rolling mean latency of successful dispatches
    pub average_latency_ms: f64,
    /// Last dispatch outcome or probe
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    /// Health of a provider nothing is known about
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            last_error: None,
            average_latency_ms: 0.0,
            last_checked_at: None,
        }
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::unknown()
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::SttRequest {}
    impl Sealed for super::TtsRequest {}
}

/// A request the orchestrator knows how to execute
///
/// Implemented for [`SttRequest`] and [`TtsRequest`] only.
#[async_trait]
pub trait SpeechRequest: sealed::Sealed + fmt::Debug + Send + Sync {
    /// What the provider returns
    type Output: Send;
    /// What the caller receives
    type Response: Clone + Serialize + DeserializeOwned + Send + Sync;

    /// Category of providers that can serve this request
    const CATEGORY: Category;

    /// Deterministic result-cache key
    fn cache_key(&self) -> &CacheKey;

    /// Caller's provider preference
    fn provider_override(&self) -> Option<&ProviderOverride>;

    /// Reject requests that no provider could serve
    fn validate(&self) -> Result<(), OrchestratorError>;

    /// Whether a provider with `capabilities` can serve this request
    fn check_capabilities(&self, capabilities: &Capabilities) -> Result<(), String>;

    /// Run the request against one provider
    async fn dispatch(&self, instance: &ProviderInstance) -> Result<Self::Output, SpeechError>;

    /// Wrap a provider result
    fn into_response(
        &self,
        output: Self::Output,
        provider_used: &str,
        processing_time_ms: u64,
    ) -> Self::Response;

    /// Mark a cached response as served from the cache
    fn from_cache(response: Self::Response, lookup_time_ms: u64) -> Self::Response;
}

#[async_trait]
impl SpeechRequest for SttRequest {
    type Output = Transcription;
    type Response = SttResponse;

    const CATEGORY: Category = Category::Stt;

    fn cache_key(&self) -> &CacheKey {
        self.cache_key.get_or_init(|| {
            CacheKey::derive(
                Category::Stt,
                &[
                    self.audio.data(),
                    self.audio.format().extension().as_bytes(),
                    opt_bytes(self.language.as_deref()),
                    self.quality.as_str().as_bytes(),
                ],
            )
        })
    }

    fn provider_override(&self) -> Option<&ProviderOverride> {
        self.provider_override.as_ref()
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.audio.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "audio payload is empty".to_string(),
            ));
        }
        Ok(())
    }

    fn check_capabilities(&self, capabilities: &Capabilities) -> Result<(), String> {
        capabilities.check_audio(&self.audio, self.language.as_deref(), self.quality)
    }

    async fn dispatch(&self, instance: &ProviderInstance) -> Result<Transcription, SpeechError> {
        let ProviderInstance::Stt(stt) = instance else {
            return Err(SpeechError::NotAvailable(
                "provider does not implement speech-to-text".to_string(),
            ));
        };
        stt.transcribe(self.audio.clone(), &self.options()).await
    }

    fn into_response(
        &self,
        output: Transcription,
        provider_used: &str,
        processing_time_ms: u64,
    ) -> SttResponse {
        SttResponse::from_transcription(output, provider_used, processing_time_ms)
    }

    fn from_cache(response: SttResponse, lookup_time_ms: u64) -> SttResponse {
        SttResponse {
            processing_time_ms: lookup_time_ms,
            cached: true,
            ..response
        }
    }
}

#[async_trait]
impl SpeechRequest for TtsRequest {
    /// Audio plus the voice that produced it
    type Output = (AudioData, String);
    type Response = TtsResponse;

    const CATEGORY: Category = Category::Tts;

    fn cache_key(&self) -> &CacheKey {
        self.cache_key.get_or_init(|| {
            CacheKey::derive(
                Category::Tts,
                &[
                    self.text.as_bytes(),
                    opt_bytes(self.language.as_deref()),
                    opt_bytes(self.voice.as_deref()),
                    opt_bytes(self.format.as_ref().map(AudioFormat::extension)),
                    self.quality.as_str().as_bytes(),
                ],
            )
        })
    }

    fn provider_override(&self) -> Option<&ProviderOverride> {
        self.provider_override.as_ref()
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.text.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "text is blank".to_string(),
            ));
        }
        Ok(())
    }

    fn check_capabilities(&self, capabilities: &Capabilities) -> Result<(), String> {
        match self.format {
            Some(format) => capabilities.check_text(
                &self.text,
                format,
                self.language.as_deref(),
                self.quality,
            ),
            // Provider picks its own default format.
            None => capabilities
                .formats
                .first()
                .copied()
                .ok_or_else(|| "provider declares no output formats".to_string())
                .and_then(|format| {
                    capabilities.check_text(
                        &self.text,
                        format,
                        self.language.as_deref(),
                        self.quality,
                    )
                }),
        }
    }

    async fn dispatch(
        &self,
        instance: &ProviderInstance,
    ) -> Result<(AudioData, String), SpeechError> {
        let ProviderInstance::Tts(tts) = instance else {
            return Err(SpeechError::NotAvailable(
                "provider does not implement text-to-speech".to_string(),
            ));
        };
        let voice = self
            .voice
            .clone()
            .unwrap_or_else(|| tts.default_voice().to_string());
        let audio = tts.synthesize(&self.text, &self.options()).await?;
        Ok((audio, voice))
    }

    fn into_response(
        &self,
        (audio, voice): (AudioData, String),
        provider_used: &str,
        processing_time_ms: u64,
    ) -> TtsResponse {
        TtsResponse {
            audio,
            voice,
            provider_used: provider_used.to_string(),
            processing_time_ms,
            cached: false,
        }
    }

    fn from_cache(response: TtsResponse, lookup_time_ms: u64) -> TtsResponse {
        TtsResponse {
            processing_time_ms: lookup_time_ms,
            cached: true,
            ..response
        }
    }
}
