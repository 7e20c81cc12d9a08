//! Orchestrator error types
//!
//! Only terminal errors cross the orchestrator boundary. Per-provider
//! failures are collected as [`ProviderFailure`]s and travel inside
//! [`OrchestratorError::AllProvidersExhausted`].

use std::fmt;

use ai_speech::SpeechError;
use serde::Serialize;
use thiserror::Error;

use crate::model::Category;

/// Why a single candidate in the fallback chain did not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Circuit breaker denied dispatch
    CircuitOpen,
    /// Provider cannot serve this request (format, language, limits)
    Unsupported,
    /// Provider instance could not be created
    Construction,
    /// Dispatch exceeded its deadline
    Timeout,
    /// Vendor call failed
    Operation,
}

impl FailureKind {
    /// Whether this outcome was recorded against the provider's health
    #[must_use]
    pub const fn counts_against_health(self) -> bool {
        matches!(self, Self::Construction | Self::Timeout | Self::Operation)
    }

    /// Stable name for logs and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::Unsupported => "unsupported",
            Self::Construction => "construction",
            Self::Timeout => "timeout",
            Self::Operation => "operation",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the ordered diagnostics list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    /// Provider name
    pub provider: String,
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable reason
    pub message: String,
}

impl ProviderFailure {
    /// Create a failure record
    #[must_use]
    pub fn new(provider: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.kind, self.message)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by the orchestration core
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Bad or missing provider configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A registered implementation does not satisfy the provider contract
    #[error("Provider '{provider}' violates the provider contract: {reason}")]
    InterfaceCompliance {
        /// Provider name
        provider: String,
        /// What is wrong
        reason: String,
    },

    /// Name already registered for the other category
    #[error("Provider '{name}' is already registered as {existing}")]
    DuplicateProvider {
        /// Provider name
        name: String,
        /// Category of the existing registration
        existing: Category,
    },

    /// No provider registered under this name
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Request rejected before any dispatch
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Empty fallback chain
    #[error("No {0} providers configured")]
    NoProvidersConfigured(Category),

    /// Provider could not be dispatched to (circuit open, construction failed)
    #[error("Provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable {
        /// Provider name
        provider: String,
        /// Why
        reason: String,
    },

    /// Vendor call failed
    #[error("Provider '{provider}' failed: {source}")]
    ProviderOperation {
        /// Provider name
        provider: String,
        /// Underlying provider error
        #[source]
        source: SpeechError,
    },

    /// Every candidate failed
    #[error("All {category} providers exhausted: {}", join_failures(.failures))]
    AllProvidersExhausted {
        /// Request category
        category: Category,
        /// Per-provider reasons in attempt order
        failures: Vec<ProviderFailure>,
    },

    /// A strict provider override failed; no fallback was allowed
    ///
    /// Wraps the per-provider `ProviderUnavailable` or `ProviderOperation`.
    #[error("Required provider failed: {0}")]
    StrictOverrideFailed(#[source] Box<OrchestratorError>),

    /// Caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Orchestrator not initialized or already shut down
    #[error("Orchestrator is not running")]
    NotRunning,
}

impl OrchestratorError {
    /// Whether the error ends the request
    ///
    /// `ProviderUnavailable` and `ProviderOperation` describe a single
    /// candidate while alternatives remain. When no alternative exists the
    /// orchestrator wraps them in `StrictOverrideFailed`, which is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::ProviderOperation { .. }
        )
    }

    /// Ordered per-provider failures, if any
    #[must_use]
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}
