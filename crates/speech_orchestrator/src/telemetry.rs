//! Tracing subscriber bootstrap

use thiserror::Error;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Install a global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `config.log_level`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(json = config.json, "Tracing initialized");
    Ok(())
}
