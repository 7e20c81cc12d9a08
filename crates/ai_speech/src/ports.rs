//! Port definitions for speech processing
//!
//! Defines the contract every capability provider satisfies. A provider wraps
//! exactly one vendor and is stateless per call; pooling, retries and timeouts
//! live in the connection layer, while fallback and failure bookkeeping belong
//! to whoever orchestrates several providers.

use async_trait::async_trait;

use crate::error::SpeechError;
use crate::types::{
    AudioData, Capabilities, SynthesisOptions, Transcription, TranscriptionOptions, VoiceInfo,
};

/// Port for Speech-to-Text (STT) implementations
///
/// # Example
///
/// ```ignore
/// use ai_speech::{SpeechToText, AudioData, AudioFormat, TranscriptionOptions};
///
/// async fn transcribe_voice_message(
///     stt: &impl SpeechToText,
///     audio: AudioData,
/// ) -> Result<String, SpeechError> {
///     let options = TranscriptionOptions::default().with_language("de");
///     let transcription = stt.transcribe(audio, &options).await?;
///     Ok(transcription.text)
/// }
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe audio to text
    ///
    /// # Errors
    ///
    /// Returns `SpeechError` if transcription fails.
    async fn transcribe(
        &self,
        audio: AudioData,
        options: &TranscriptionOptions,
    ) -> Result<Transcription, SpeechError>;

    /// Accepted input formats, languages and limits
    fn capabilities(&self) -> &Capabilities;

    /// Cheap liveness probe (metadata call, never a billed operation)
    ///
    /// # Errors
    ///
    /// Returns `SpeechError` describing why the service is unreachable.
    async fn health_check(&self) -> Result<(), SpeechError>;

    /// Name of the vendor model in use
    fn model_name(&self) -> &str;
}

/// Port for Text-to-Speech (TTS) implementations
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Convert text to speech
    ///
    /// Unset fields in `options` fall back to the provider's defaults.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError` if synthesis fails or the format is not supported.
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<AudioData, SpeechError>;

    /// List available voices
    ///
    /// # Errors
    ///
    /// Returns `SpeechError` if listing fails.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError>;

    /// Producible output formats, languages and limits
    fn capabilities(&self) -> &Capabilities;

    /// Cheap liveness probe (metadata call, never a billed operation)
    ///
    /// # Errors
    ///
    /// Returns `SpeechError` describing why the service is unreachable.
    async fn health_check(&self) -> Result<(), SpeechError>;

    /// Name of the vendor model in use
    fn model_name(&self) -> &str;

    /// Voice used when the caller does not pick one
    fn default_voice(&self) -> &str;
}
