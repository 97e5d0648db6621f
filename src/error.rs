//! Error taxonomy for the deployment pipeline
//!
//! Every variant names the key, path, mode or stage that failed so the
//! operator can act on it without reading logs.

use crate::adapters::AdapterError;
use crate::core::template::RenderError;
use thiserror::Error;

/// Errors raised while resolving, rendering or executing a deployment
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("missing required configuration '{key}' ({description})")]
    MissingRequiredConfig { key: String, description: String },

    #[error("missing required configuration: {}", format_missing(.missing))]
    MissingConfiguration { missing: Vec<(String, String)> },

    #[error("infrastructure state unavailable at {location}: {reason}")]
    StateUnavailable { location: String, reason: String },

    #[error("required infrastructure output '{path}' is missing ({description})")]
    RequiredOutputMissing { path: String, description: String },

    #[error("invalid {mode} '{value}' (allowed: {})", .allowed.join(", "))]
    InvalidMode {
        mode: String,
        value: String,
        allowed: Vec<&'static str>,
    },

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("invalid expiry '{value}': {reason}")]
    InvalidExpiry { value: String, reason: String },

    #[error("failed to generate credential '{name}': {reason}")]
    CredentialGenerationFailed { name: String, reason: String },

    #[error("{operation} failed: {source}")]
    ExternalAdapterFailure {
        operation: String,
        #[source]
        source: AdapterError,
    },

    #[error("stage '{stage}' postcondition not met: {reason}")]
    VerificationFailed { stage: String, reason: String },

    #[error("stage timed out after {secs} seconds")]
    StageTimeout { secs: u64 },

    #[error("pipeline aborted at stage '{stage}': {source}")]
    StageAborted {
        stage: String,
        #[source]
        source: Box<DeployError>,
    },

    #[error("interrupted before stage '{stage}'")]
    Interrupted { stage: String },
}

impl DeployError {
    /// Wrap an adapter error with the operation that triggered it
    pub fn adapter(operation: impl Into<String>, source: AdapterError) -> Self {
        DeployError::ExternalAdapterFailure {
            operation: operation.into(),
            source,
        }
    }
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(key, description)| format!("'{}' ({})", key, description))
        .collect::<Vec<_>>()
        .join(", ")
}
