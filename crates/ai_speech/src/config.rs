//! Configuration for the OpenAI speech provider

use serde::{Deserialize, Serialize};

use crate::types::{AudioFormat, QualityTier};

/// Configuration for the OpenAI Whisper / TTS provider
#[derive(Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// OpenAI API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// OpenAI API base URL (for custom endpoints and tests)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Speech-to-text model
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Text-to-speech model for the standard quality tier
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Text-to-speech model for the high quality tier
    #[serde(default = "default_tts_hd_model")]
    pub tts_hd_model: String,

    /// Default voice for TTS
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Output audio format for TTS when the caller does not pick one
    #[serde(default = "default_output_format")]
    pub output_format: AudioFormat,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum audio duration in milliseconds
    #[serde(default = "default_max_audio_duration_ms")]
    pub max_audio_duration_ms: u64,

    /// TTS speaking speed (0.25 to 4.0)
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_hd_model() -> String {
    "tts-1-hd".to_string()
}

fn default_voice() -> String {
    "nova".to_string()
}

const fn default_output_format() -> AudioFormat {
    AudioFormat::Opus
}

const fn default_timeout_ms() -> u64 {
    30000 // 30 seconds
}

const fn default_max_audio_duration_ms() -> u64 {
    120_000 // 2 minutes
}

const fn default_speed() -> f32 {
    1.0
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            stt_model: default_stt_model(),
            tts_model: default_tts_model(),
            tts_hd_model: default_tts_hd_model(),
            default_voice: default_voice(),
            output_format: default_output_format(),
            timeout_ms: default_timeout_ms(),
            max_audio_duration_ms: default_max_audio_duration_ms(),
            speed: default_speed(),
        }
    }
}

impl std::fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("stt_model", &self.stt_model)
            .field("tts_model", &self.tts_model)
            .field("tts_hd_model", &self.tts_hd_model)
            .field("default_voice", &self.default_voice)
            .field("output_format", &self.output_format)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_audio_duration_ms", &self.max_audio_duration_ms)
            .field("speed", &self.speed)
            .finish()
    }
}

impl SpeechConfig {
    /// Config with an API key pointing at `base_url`
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// TTS model serving the given quality tier
    #[must_use]
    pub fn tts_model_for(&self, quality: QualityTier) -> &str {
        match quality {
            QualityTier::Standard => &self.tts_model,
            QualityTier::High => &self.tts_hd_model,
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
            return Err("OpenAI API key is required".to_string());
        }

        if self.base_url.trim().is_empty() {
            return Err("Base URL must not be empty".to_string());
        }

        if !(0.25..=4.0).contains(&self.speed) {
            return Err(format!(
                "Speed must be between 0.25 and 4.0, got {}",
                self.speed
            ));
        }

        if self.timeout_ms == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.max_audio_duration_ms == 0 {
            return Err("Max audio duration must be greater than 0".to_string());
        }

        Ok(())
    }
}
