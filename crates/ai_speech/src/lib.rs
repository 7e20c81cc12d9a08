//! AI Speech - Speech-to-Text and Text-to-Speech abstractions
//!
//! Provides the capability provider contract and the plumbing vendors share:
//! - `SpeechToText` - Transcribe audio to text (STT)
//! - `TextToSpeech` - Synthesize speech from text (TTS)
//! - `ConnectionManager` - Pooled, rate-bounded HTTP access per provider
//!
//! # Architecture
//!
//! This crate follows the ports & adapters pattern:
//! - `ports` module defines the traits (ports)
//! - `providers` module contains concrete implementations (adapters)
//! - `connection` and `retry` hold the network policy providers run under
//!
//! # Example
//!
//! ```ignore
//! use ai_speech::{ConnectionManager, OpenAISpeechProvider, SpeechToText, AudioData, AudioFormat};
//!
//! let connections = ConnectionManager::default();
//! let provider = OpenAISpeechProvider::new(config, connections.connection("openai")?)?;
//!
//! let audio = AudioData::new(bytes, AudioFormat::Mp3);
//! let transcription = provider.transcribe(audio, &TranscriptionOptions::default()).await?;
//! println!("Transcribed: {}", transcription.text);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod ports;
pub mod providers;
pub mod retry;
pub mod types;

pub use config::SpeechConfig;
pub use connection::{ConnectionManager, ConnectionPolicy, ProviderConnection};
pub use error::SpeechError;
pub use ports::{SpeechToText, TextToSpeech};
pub use providers::openai::OpenAISpeechProvider;
pub use retry::{RetryConfig, Retryable};
pub use types::{
    AudioData, AudioFormat, Capabilities, QualityTier, SynthesisOptions, Transcription,
    TranscriptionOptions, VoiceGender, VoiceInfo, WordTimestamp,
};
