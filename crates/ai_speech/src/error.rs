//! Speech processing errors

use thiserror::Error;

use crate::retry::Retryable;

/// Errors that can occur during speech processing
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Failed to connect to speech service
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request to speech service failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Invalid audio format or corrupted data
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// Audio too long for processing
    #[error("Audio too long: {duration_ms}ms exceeds maximum of {max_ms}ms")]
    AudioTooLong {
        /// Duration of the provided audio
        duration_ms: u64,
        /// Maximum allowed duration
        max_ms: u64,
    },

    /// Text too long for synthesis
    #[error("Text too long: {chars} characters exceeds maximum of {max_chars}")]
    TextTooLong {
        /// Length of the provided text
        chars: usize,
        /// Maximum allowed length
        max_chars: usize,
    },

    /// Transcription failed
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Synthesis failed
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Invalid response from service
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Timeout during processing
    #[error("Speech processing timeout after {0}ms")]
    Timeout(u64),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Voice not found
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Service unavailable (5xx, maintenance)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Requested format cannot be produced or consumed
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Provider not available (not installed or configured)
    #[error("Provider not available: {0}")]
    NotAvailable(String),
}

impl SpeechError {
    /// Whether repeating the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::Timeout(_)
                | Self::RateLimited
                | Self::ServiceUnavailable(_)
        )
    }
}

impl Retryable for SpeechError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_connect() {
            Self::ConnectionFailed(err.to_string())
        } else {
            Self::RequestFailed(err.to_string())
        }
    }
}
