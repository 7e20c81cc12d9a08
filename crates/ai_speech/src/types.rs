//! Types for speech processing
//!
//! Contains data structures for audio data, formats, transcriptions, voice
//! information and the capability declarations providers publish.

use serde::{Deserialize, Serialize};

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Opus codec (used by most messenger voice notes)
    Opus,
    /// OGG container (typically with Opus codec)
    Ogg,
    /// MP3 format
    Mp3,
    /// WAV format (uncompressed)
    Wav,
    /// FLAC format (lossless)
    Flac,
    /// WebM format
    Webm,
    /// M4A/AAC format
    M4a,
}

impl AudioFormat {
    /// Get the MIME type for this audio format
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Opus => "audio/opus",
            Self::Ogg => "audio/ogg",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
            Self::Webm => "audio/webm",
            Self::M4a => "audio/m4a",
        }
    }

    /// Get the file extension for this audio format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Webm => "webm",
            Self::M4a => "m4a",
        }
    }

    /// Parse audio format from MIME type
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        // Handle compound MIME types like "audio/ogg; codecs=opus"
        let base_mime = mime.split(';').next().unwrap_or(mime).trim();

        match base_mime {
            "audio/opus" => Some(Self::Opus),
            "audio/ogg" => {
                if mime.contains("codecs=opus") {
                    Some(Self::Opus)
                } else {
                    Some(Self::Ogg)
                }
            },
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(Self::Wav),
            "audio/flac" | "audio/x-flac" => Some(Self::Flac),
            "audio/webm" => Some(Self::Webm),
            "audio/m4a" | "audio/mp4" | "audio/x-m4a" => Some(Self::M4a),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quality tier requested by the caller
///
/// Providers map the tier onto their own model lineup (e.g. a standard and an
/// HD synthesis model).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Fast, inexpensive processing
    #[default]
    Standard,
    /// Highest quality the provider offers
    High,
}

impl QualityTier {
    /// Stable lowercase name, used in cache fingerprints
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container for audio data with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioData {
    /// Raw audio bytes (base64 when serialized)
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
    /// Audio format
    format: AudioFormat,
    /// Duration in milliseconds (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    /// Sample rate in Hz (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
}

impl AudioData {
    /// Create new audio data
    #[must_use]
    pub const fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            data,
            format,
            duration_ms: None,
            sample_rate: None,
        }
    }

    /// Create audio data with duration
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create audio data with sample rate
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Get the raw audio bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume and return the raw audio bytes
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Get the audio format
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Get the duration in milliseconds (if known)
    #[must_use]
    pub const fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Get the sample rate (if known)
    #[must_use]
    pub const fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Get the size of the audio data in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if the audio data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the MIME type for this audio
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Generate a filename with appropriate extension
    #[must_use]
    pub fn filename(&self, base: &str) -> String {
        format!("{}.{}", base, self.format.extension())
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Result of speech-to-text transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    /// Transcribed text
    pub text: String,
    /// Detected language (ISO 639-1 code)
    pub language: Option<String>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: Option<f32>,
    /// Duration of the audio in milliseconds
    pub duration_ms: Option<u64>,
    /// Word-level timestamps (if available)
    pub words: Option<Vec<WordTimestamp>>,
}

impl Transcription {
    /// Create a simple transcription with just text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            confidence: None,
            duration_ms: None,
            words: None,
        }
    }

    /// Set the detected language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the confidence score
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the duration
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Check if transcription is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Word-level timestamp from transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    /// The word
    pub word: String,
    /// Start time in milliseconds
    pub start_ms: u64,
    /// End time in milliseconds
    pub end_ms: u64,
    /// Confidence for this word
    pub confidence: Option<f32>,
}

/// Information about an available voice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Voice identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description of the voice
    pub description: Option<String>,
    /// Supported languages
    pub languages: Vec<String>,
    /// Voice gender (if known)
    pub gender: Option<VoiceGender>,
}

impl VoiceInfo {
    /// Create a new voice info
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            languages: Vec::new(),
            gender: None,
        }
    }
}

/// Voice gender classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    /// Male voice
    Male,
    /// Female voice
    Female,
    /// Neutral/androgynous voice
    Neutral,
}

/// What a provider can do
///
/// Empty `languages` or `qualities` lists mean "no restriction". `formats`
/// lists accepted input formats for STT and producible output formats for TTS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Audio formats the provider handles
    pub formats: Vec<AudioFormat>,
    /// Supported languages (ISO 639-1, optionally with region)
    #[serde(default)]
    pub languages: Vec<String>,
    /// Supported quality tiers
    #[serde(default)]
    pub qualities: Vec<QualityTier>,
    /// Maximum accepted audio payload in bytes
    #[serde(default)]
    pub max_input_bytes: Option<usize>,
    /// Maximum accepted text length in characters
    #[serde(default)]
    pub max_text_chars: Option<usize>,
    /// Maximum accepted audio duration in milliseconds
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
}

impl Capabilities {
    /// Create capabilities for the given formats with no other restriction
    #[must_use]
    pub fn new(formats: impl IntoIterator<Item = AudioFormat>) -> Self {
        Self {
            formats: formats.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Restrict to the given languages
    #[must_use]
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to the given quality tiers
    #[must_use]
    pub fn with_qualities(mut self, qualities: impl IntoIterator<Item = QualityTier>) -> Self {
        self.qualities = qualities.into_iter().collect();
        self
    }

    /// Set the maximum input size in bytes
    #[must_use]
    pub const fn with_max_input_bytes(mut self, max: usize) -> Self {
        self.max_input_bytes = Some(max);
        self
    }

    /// Set the maximum text length in characters
    #[must_use]
    pub const fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = Some(max);
        self
    }

    /// Set the maximum audio duration
    #[must_use]
    pub const fn with_max_duration_ms(mut self, max: u64) -> Self {
        self.max_duration_ms = Some(max);
        self
    }

    /// Check whether a format is handled
    #[must_use]
    pub fn supports_format(&self, format: AudioFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Check whether a language is handled
    ///
    /// Matching is case-insensitive and falls back to the primary subtag, so
    /// `de-DE` is served by a provider declaring `de` and vice versa.
    #[must_use]
    pub fn supports_language(&self, language: &str) -> bool {
        if self.languages.is_empty() {
            return true;
        }
        let wanted = primary_subtag(language);
        self.languages.iter().any(|declared| {
            declared.eq_ignore_ascii_case(language)
                || primary_subtag(declared).eq_ignore_ascii_case(wanted)
        })
    }

    /// Check whether a quality tier is handled
    #[must_use]
    pub fn supports_quality(&self, quality: QualityTier) -> bool {
        self.qualities.is_empty() || self.qualities.contains(&quality)
    }

    /// Check whether an audio input can be transcribed
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the input is outside the declared limits.
    pub fn check_audio(
        &self,
        audio: &AudioData,
        language: Option<&str>,
        quality: QualityTier,
    ) -> Result<(), String> {
        if !self.supports_format(audio.format()) {
            return Err(format!("format {} not supported", audio.format()));
        }
        if let Some(max) = self.max_input_bytes {
            if audio.size_bytes() > max {
                return Err(format!(
                    "audio of {} bytes exceeds limit of {max} bytes",
                    audio.size_bytes()
                ));
            }
        }
        if let (Some(max), Some(duration)) = (self.max_duration_ms, audio.duration_ms()) {
            if duration > max {
                return Err(format!("audio of {duration}ms exceeds limit of {max}ms"));
            }
        }
        self.check_common(language, quality)
    }

    /// Check whether a text input can be synthesized into `format`
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the input is outside the declared limits.
    pub fn check_text(
        &self,
        text: &str,
        format: AudioFormat,
        language: Option<&str>,
        quality: QualityTier,
    ) -> Result<(), String> {
        if !self.supports_format(format) {
            return Err(format!("output format {format} not supported"));
        }
        if let Some(max) = self.max_text_chars {
            let chars = text.chars().count();
            if chars > max {
                return Err(format!("text of {chars} characters exceeds limit of {max}"));
            }
        }
        self.check_common(language, quality)
    }

    fn check_common(&self, language: Option<&str>, quality: QualityTier) -> Result<(), String> {
        if let Some(language) = language {
            if !self.supports_language(language) {
                return Err(format!("language {language} not supported"));
            }
        }
        if !self.supports_quality(quality) {
            return Err(format!("quality tier {quality} not supported"));
        }
        Ok(())
    }
}

fn primary_subtag(language: &str) -> &str {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .trim()
}

/// Per-call options for transcription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptionOptions {
    /// Language hint (ISO 639-1)
    pub language: Option<String>,
    /// Requested quality tier
    pub quality: QualityTier,
}

impl TranscriptionOptions {
    /// Set the language hint
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the quality tier
    #[must_use]
    pub const fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }
}

/// Per-call options for synthesis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Voice identifier (provider default when `None`)
    pub voice: Option<String>,
    /// Desired output format (provider default when `None`)
    pub format: Option<AudioFormat>,
    /// Language of the text
    pub language: Option<String>,
    /// Requested quality tier
    pub quality: QualityTier,
}

impl SynthesisOptions {
    /// Set the voice
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the output format
    #[must_use]
    pub const fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the quality tier
    #[must_use]
    pub const fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }
}
