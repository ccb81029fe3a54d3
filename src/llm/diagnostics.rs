//! Failure reporting for council invocations

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::error::TransportError;
use crate::llm::BackendId;

/// Why a backend produced no result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("invocation task aborted: {0}")]
    Aborted(String),

    #[error("dispatch cancelled")]
    Cancelled,
}

impl From<TransportError> for FailureCause {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => FailureCause::Timeout(after),
            other => FailureCause::Transport(other.to_string()),
        }
    }
}

/// A single backend failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    pub backend: BackendId,
    pub cause: FailureCause,
}

/// Receives failure records; must not block
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, failure: InvocationFailure);
}

/// Default sink: one `warn!` event per failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record(&self, failure: InvocationFailure) {
        warn!(
            backend = %failure.backend,
            cause = %failure.cause,
            "Error querying model"
        );
    }
}
