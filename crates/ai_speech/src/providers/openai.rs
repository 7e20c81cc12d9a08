//! OpenAI Speech Provider
//!
//! Implements `SpeechToText` using OpenAI Whisper and `TextToSpeech` using OpenAI TTS.
//! All traffic goes through a [`ProviderConnection`], so pooling, retries and
//! the per-provider timeout are applied uniformly.
//!
//! # Supported Audio Formats
//!
//! ## STT (Whisper)
//! - mp3, m4a, wav, webm, flac, ogg
//!
//! ## TTS
//! - mp3, opus, aac, flac, wav

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SpeechConfig;
use crate::connection::{ConnectionPolicy, ProviderConnection};
use crate::error::SpeechError;
use crate::ports::{SpeechToText, TextToSpeech};
use crate::types::{
    AudioData, AudioFormat, Capabilities, SynthesisOptions, Transcription, TranscriptionOptions,
    VoiceGender, VoiceInfo,
};

/// Whisper upload limit
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// TTS input limit
const MAX_TTS_CHARS: usize = 4096;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// OpenAI speech provider implementing both STT and TTS
#[derive(Debug, Clone)]
pub struct OpenAISpeechProvider {
    connection: ProviderConnection,
    config: SpeechConfig,
    stt_capabilities: Capabilities,
    tts_capabilities: Capabilities,
}

impl OpenAISpeechProvider {
    /// Create a provider on an existing pooled connection
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if the configuration is invalid.
    pub fn new(config: SpeechConfig, connection: ProviderConnection) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Configuration)?;

        let stt_capabilities = Capabilities::new([
            AudioFormat::Mp3,
            AudioFormat::M4a,
            AudioFormat::Wav,
            AudioFormat::Webm,
            AudioFormat::Flac,
            AudioFormat::Ogg,
        ])
        .with_max_input_bytes(MAX_UPLOAD_BYTES)
        .with_max_duration_ms(config.max_audio_duration_ms);

        let tts_capabilities = Capabilities::new([
            AudioFormat::Mp3,
            AudioFormat::Opus,
            AudioFormat::M4a,
            AudioFormat::Flac,
            AudioFormat::Wav,
        ])
        .with_max_text_chars(MAX_TTS_CHARS);

        Ok(Self {
            connection,
            config,
            stt_capabilities,
            tts_capabilities,
        })
    }

    /// Create a provider with its own pool, using the config's timeout
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if the configuration is invalid.
    pub fn standalone(config: SpeechConfig) -> Result<Self, SpeechError> {
        let policy = ConnectionPolicy::default().with_timeout_ms(config.timeout_ms);
        let connection = ProviderConnection::new("openai", policy)?;
        Self::new(config, connection)
    }

    fn api_key(&self) -> &str {
        self.config.api_key.as_deref().unwrap_or_default()
    }

    fn stt_url(&self) -> String {
        format!("{}/audio/transcriptions", self.config.base_url)
    }

    fn tts_url(&self) -> String {
        format!("{}/audio/speech", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    /// Convert OpenAI response format string to `AudioFormat`
    fn response_format_to_audio_format(format: &str) -> AudioFormat {
        match format {
            "opus" => AudioFormat::Opus,
            "aac" => AudioFormat::M4a,
            "flac" => AudioFormat::Flac,
            "wav" | "pcm" => AudioFormat::Wav,
            _ => AudioFormat::Mp3,
        }
    }

    /// Convert `AudioFormat` to OpenAI TTS response format string
    const fn audio_format_to_response_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus | AudioFormat::Ogg | AudioFormat::Webm => "opus",
            AudioFormat::M4a => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    async fn ping(&self) -> Result<(), SpeechError> {
        let url = self.models_url();
        let response = self
            .connection
            .send(|client| {
                Ok(client
                    .get(&url)
                    .bearer_auth(self.api_key())
                    .timeout(HEALTH_CHECK_TIMEOUT))
            })
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SpeechError::Configuration(
                "OpenAI rejected the API key".to_string(),
            )),
            status => Err(SpeechError::ServiceUnavailable(format!(
                "health check returned {status}"
            ))),
        }
    }
}

/// OpenAI Whisper transcription response
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// OpenAI TTS request body
#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

/// OpenAI API error response
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    code: Option<String>,
}

/// What a failed call was about, for error mapping
enum Operation<'a> {
    Transcribe { model: &'a str },
    Synthesize { model: &'a str, voice: &'a str },
}

fn map_api_error(status: StatusCode, body: &str, operation: &Operation<'_>) -> SpeechError {
    let failed = |message: String| match operation {
        Operation::Transcribe { .. } => SpeechError::TranscriptionFailed(message),
        Operation::Synthesize { .. } => SpeechError::SynthesisFailed(message),
    };

    let Ok(api_error) = serde_json::from_str::<ApiError>(body) else {
        return failed(format!("HTTP {status}: {body}"));
    };

    match (api_error.error.code.as_deref(), operation) {
        (Some("rate_limit_exceeded"), _) => SpeechError::RateLimited,
        (
            Some("model_not_found"),
            Operation::Transcribe { model } | Operation::Synthesize { model, .. },
        ) => SpeechError::ModelNotAvailable((*model).to_string()),
        (Some("invalid_voice"), Operation::Synthesize { voice, .. }) => {
            SpeechError::VoiceNotFound((*voice).to_string())
        },
        _ => failed(api_error.error.message),
    }
}

#[async_trait]
impl SpeechToText for OpenAISpeechProvider {
    #[instrument(skip(self, audio, options), fields(audio_size = audio.size_bytes(), format = %audio.format()))]
    async fn transcribe(
        &self,
        audio: AudioData,
        options: &TranscriptionOptions,
    ) -> Result<Transcription, SpeechError> {
        debug!("Transcribing audio with OpenAI Whisper");

        if audio.is_empty() {
            return Err(SpeechError::InvalidAudio("Audio data is empty".to_string()));
        }

        if let Some(duration_ms) = audio.duration_ms() {
            if duration_ms > self.config.max_audio_duration_ms {
                return Err(SpeechError::AudioTooLong {
                    duration_ms,
                    max_ms: self.config.max_audio_duration_ms,
                });
            }
        }

        if !self.stt_capabilities.supports_format(audio.format()) {
            return Err(SpeechError::UnsupportedFormat(format!(
                "Whisper does not accept {} input",
                audio.format()
            )));
        }

        let filename = audio.filename("audio");
        let mime_type = audio.mime_type();
        let data = audio.into_data();
        let url = self.stt_url();
        let model = self.config.stt_model.as_str();

        let response = self
            .connection
            .send(|client| {
                let file_part = Part::bytes(data.clone())
                    .file_name(filename.clone())
                    .mime_str(mime_type)
                    .map_err(|e| SpeechError::InvalidAudio(format!("Invalid MIME type: {e}")))?;

                let mut form = Form::new()
                    .part("file", file_part)
                    .text("model", model.to_string());
                if let Some(language) = &options.language {
                    form = form.text("language", language.clone());
                }

                Ok(client
                    .post(&url)
                    .bearer_auth(self.api_key())
                    .multipart(form))
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_api_error(
                status,
                &body,
                &Operation::Transcribe { model },
            ));
        }

        let whisper_response: WhisperResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        debug!(
            text_len = whisper_response.text.len(),
            language = ?whisper_response.language,
            "Transcription complete"
        );

        let mut transcription = Transcription::new(whisper_response.text);

        // Whisper only reports the language when it detected it itself.
        match (whisper_response.language, &options.language) {
            (Some(detected), _) => transcription = transcription.with_language(detected),
            (None, Some(hint)) => transcription = transcription.with_language(hint.clone()),
            (None, None) => {},
        }

        if let Some(duration) = whisper_response.duration {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let duration_ms = (duration * 1000.0) as u64;
            transcription = transcription.with_duration(duration_ms);
        }

        Ok(transcription)
    }

    fn capabilities(&self) -> &Capabilities {
        &self.stt_capabilities
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        self.ping().await
    }

    fn model_name(&self) -> &str {
        &self.config.stt_model
    }
}

#[async_trait]
impl TextToSpeech for OpenAISpeechProvider {
    #[instrument(skip(self, text, options), fields(text_len = text.len(), quality = %options.quality))]
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<AudioData, SpeechError> {
        debug!("Synthesizing speech with OpenAI TTS");

        if text.trim().is_empty() {
            return Err(SpeechError::SynthesisFailed(
                "Text cannot be empty".to_string(),
            ));
        }

        let chars = text.chars().count();
        if chars > MAX_TTS_CHARS {
            return Err(SpeechError::TextTooLong {
                chars,
                max_chars: MAX_TTS_CHARS,
            });
        }

        let format = options.format.unwrap_or(self.config.output_format);
        if !self.tts_capabilities.supports_format(format) {
            return Err(SpeechError::UnsupportedFormat(format!(
                "OpenAI TTS cannot produce {format}"
            )));
        }

        let voice = options
            .voice
            .as_deref()
            .unwrap_or(&self.config.default_voice);
        let model = self.config.tts_model_for(options.quality);
        let response_format = Self::audio_format_to_response_format(format);

        let request = TtsRequest {
            model,
            input: text,
            voice,
            response_format,
            speed: if (self.config.speed - 1.0).abs() < f32::EPSILON {
                None
            } else {
                Some(self.config.speed)
            },
        };

        let url = self.tts_url();
        let response = self
            .connection
            .send(|client| {
                Ok(client
                    .post(&url)
                    .bearer_auth(self.api_key())
                    .json(&request))
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_api_error(
                status,
                &body,
                &Operation::Synthesize { model, voice },
            ));
        }

        let audio_bytes: Bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::InvalidResponse(format!("Failed to read audio: {e}")))?;

        if audio_bytes.is_empty() {
            return Err(SpeechError::InvalidResponse(
                "OpenAI returned no audio".to_string(),
            ));
        }

        debug!(audio_size = audio_bytes.len(), "Speech synthesis complete");

        let output_format = Self::response_format_to_audio_format(response_format);
        Ok(AudioData::new(audio_bytes.to_vec(), output_format))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError> {
        // OpenAI has no voices endpoint
        const VOICES: [(&str, &str, &str, VoiceGender); 6] = [
            ("alloy", "Alloy", "Neutral and balanced voice", VoiceGender::Neutral),
            ("echo", "Echo", "Warm and conversational voice", VoiceGender::Male),
            ("fable", "Fable", "British-accented storyteller voice", VoiceGender::Male),
            ("onyx", "Onyx", "Deep and authoritative voice", VoiceGender::Male),
            ("nova", "Nova", "Friendly and upbeat voice", VoiceGender::Female),
            ("shimmer", "Shimmer", "Clear and expressive voice", VoiceGender::Female),
        ];

        Ok(VOICES
            .iter()
            .map(|(id, name, description, gender)| VoiceInfo {
                id: (*id).to_string(),
                name: (*name).to_string(),
                description: Some((*description).to_string()),
                languages: vec!["en".to_string(), "de".to_string(), "es".to_string()],
                gender: Some(*gender),
            })
            .collect())
    }

    fn capabilities(&self) -> &Capabilities {
        &self.tts_capabilities
    }

    async fn health_check(&self) -> Result<(), SpeechError> {
        self.ping().await
    }

    fn model_name(&self) -> &str {
        &self.config.tts_model
    }

    fn default_voice(&self) -> &str {
        &self.config.default_voice
    }
}
