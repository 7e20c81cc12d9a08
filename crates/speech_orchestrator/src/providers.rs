//! Built-in provider registrations
//!
//! Maps provider names to constructors over the `ai_speech` adapters and
//! applies per-provider settings from [`OrchestratorConfig`](crate::OrchestratorConfig).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ai_speech::{AudioFormat, ConnectionManager, OpenAISpeechProvider, SpeechConfig, SpeechError};
use tracing::debug;

use crate::config::ProviderSettings;
use crate::error::OrchestratorError;
use crate::factory::{
    ProviderConfig, ProviderConstructor, ProviderDescriptor, ProviderFactory, ProviderInstance,
};
use crate::model::Category;

/// OpenAI Whisper transcription
pub const OPENAI_WHISPER: &str = "openai-whisper";

/// OpenAI speech synthesis
pub const OPENAI_TTS: &str = "openai-tts";

const BUILTIN_PRIORITY: u32 = 10;

/// Register every built-in provider
///
/// Each provider gets its own connection pool named after the provider, so
/// per-provider connection policies apply independently.
pub fn register_builtin(
    factory: &ProviderFactory,
    connections: &ConnectionManager,
) -> Result<(), OrchestratorError> {
    factory.register(
        ProviderDescriptor::new(
            OPENAI_WHISPER,
            Category::Stt,
            openai_constructor(OPENAI_WHISPER, Category::Stt, connections.clone()),
        )
        .with_priority(BUILTIN_PRIORITY)
        .with_required_fields(["api_key"]),
    )?;
    factory.register(
        ProviderDescriptor::new(
            OPENAI_TTS,
            Category::Tts,
            openai_constructor(OPENAI_TTS, Category::Tts, connections.clone()),
        )
        .with_priority(BUILTIN_PRIORITY)
        .with_required_fields(["api_key"]),
    )?;
    Ok(())
}

fn openai_constructor(
    pool: &'static str,
    category: Category,
    connections: ConnectionManager,
) -> ProviderConstructor {
    ProviderConstructor::from_fn(move |config| {
        let speech_config = speech_config(&config)?;
        // An explicit timeout_ms overrides the pool's request timeout.
        if config.get("timeout_ms").is_some() {
            let policy = connections.policy(pool);
            if policy.timeout_ms != speech_config.timeout_ms {
                debug!(pool, timeout_ms = speech_config.timeout_ms, "Applying provider timeout");
                connections.set_policy(pool, policy.with_timeout_ms(speech_config.timeout_ms));
            }
        }
        let connection = connections.connection(pool)?;
        let provider = Arc::new(OpenAISpeechProvider::new(speech_config, connection)?);
        Ok(match category {
            Category::Stt => ProviderInstance::Stt(provider),
            Category::Tts => ProviderInstance::Tts(provider),
        })
    })
}

/// Build an OpenAI config from string settings
fn speech_config(config: &ProviderConfig) -> Result<SpeechConfig, SpeechError> {
    let mut speech = SpeechConfig {
        api_key: config.get("api_key").map(str::to_string),
        ..SpeechConfig::default()
    };

    let strings = [
        ("base_url", &mut speech.base_url),
        ("stt_model", &mut speech.stt_model),
        ("tts_model", &mut speech.tts_model),
        ("tts_hd_model", &mut speech.tts_hd_model),
        ("default_voice", &mut speech.default_voice),
    ];
    for (key, target) in strings {
        if let Some(value) = config.get(key) {
            *target = value.to_string();
        }
    }

    if let Some(value) = config.get("output_format") {
        speech.output_format = parse_format(value)?;
    }
    if let Some(value) = config.get("timeout_ms") {
        speech.timeout_ms = parse_number("timeout_ms", value)?;
    }
    if let Some(value) = config.get("max_audio_duration_ms") {
        speech.max_audio_duration_ms = parse_number("max_audio_duration_ms", value)?;
    }
    if let Some(value) = config.get("speed") {
        speech.speed = parse_number("speed", value)?;
    }

    Ok(speech)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SpeechError> {
    value
        .trim()
        .parse()
        .map_err(|_| SpeechError::Configuration(format!("{key} is not a valid number: {value}")))
}

fn parse_format(value: &str) -> Result<AudioFormat, SpeechError> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| SpeechError::Configuration(format!("unknown audio format: {value}")))
}

/// Apply configured settings to registered providers
///
/// Settings for names that are not registered are rejected so typos surface
/// at startup.
pub fn apply_settings(
    factory: &ProviderFactory,
    connections: &ConnectionManager,
    providers: &BTreeMap<String, ProviderSettings>,
) -> Result<(), OrchestratorError> {
    for (name, settings) in providers {
        let mut descriptor = factory
            .descriptor(name)
            .ok_or_else(|| OrchestratorError::UnknownProvider(name.clone()))?;

        descriptor.enabled = settings.enabled;
        if let Some(priority) = settings.priority {
            descriptor.priority = priority;
        }
        if let Some(timeout_ms) = settings.timeout_ms {
            descriptor.dispatch_timeout = Some(Duration::from_millis(timeout_ms));
        }
        factory.register(descriptor)?;

        if let Some(policy) = &settings.connection {
            connections.set_policy(name.clone(), policy.clone());
        }
        factory.configure(name, settings.settings.clone().into_iter().collect())?;

        debug!(provider = %name, enabled = settings.enabled, "Applied provider settings");
    }
    Ok(())
}
