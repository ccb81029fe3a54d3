//! Error types for llm-council

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CouncilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid backend identifier: {0:?}")]
    InvalidBackend(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CouncilError>;

/// Failure reported by a model transport for a single call
#[derive(Error, Debug)]
pub enum TransportError {
    /// The backend does not accept an optional request parameter.
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(&'static str),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("No enabled provider for backend {0}")]
    UnknownRoute(String),

    #[error("No API key configured for {0}")]
    MissingApiKey(String),
}

impl TransportError {
    pub fn is_unsupported_parameter(&self) -> bool {
        matches!(self, TransportError::UnsupportedParameter(_))
    }
}
