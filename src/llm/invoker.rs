//! Single-backend invocation with timeout and failure isolation

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;
use crate::llm::{
    BackendId, ChatMessage, DiagnosticsSink, FailureCause, InvocationFailure, ModelTransport,
    ProviderResponse, TracingDiagnostics,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of asking one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    /// The backend answered. `content` is `None` when the reply carried no text.
    Success { content: Option<String> },
    /// The call failed or timed out.
    Absent,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, InvocationResult::Absent)
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            InvocationResult::Success { content } => content.as_deref(),
            InvocationResult::Absent => None,
        }
    }
}

/// `{"content": ...}` for answers, `null` for absent backends
impl Serialize for InvocationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InvocationResult::Success { content } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("content", content)?;
                map.end()
            }
            InvocationResult::Absent => serializer.serialize_none(),
        }
    }
}

/// Calls one backend through a [`ModelTransport`] and never fails
pub struct BackendInvoker {
    transport: Arc<dyn ModelTransport>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    timeout: Duration,
}

impl BackendInvoker {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            transport,
            diagnostics: Arc::new(TracingDiagnostics),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke with the configured timeout
    pub async fn invoke(&self, backend: &BackendId, messages: &[ChatMessage]) -> InvocationResult {
        self.invoke_with_timeout(backend, messages, self.timeout)
            .await
    }

    /// Ask `backend` and normalize the reply.
    ///
    /// The deadline covers the whole invocation, including the retry without
    /// a timeout parameter, so a backend that ignores timeouts still cannot
    /// outlive it. Failures are reported to the diagnostics sink and come back
    /// as [`InvocationResult::Absent`].
    pub async fn invoke_with_timeout(
        &self,
        backend: &BackendId,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> InvocationResult {
        if backend.as_str().trim().is_empty() {
            self.record_failure(backend, FailureCause::InvalidRequest("empty backend id"));
            return InvocationResult::Absent;
        }
        if messages.is_empty() {
            self.record_failure(backend, FailureCause::InvalidRequest("no messages"));
            return InvocationResult::Absent;
        }
        if timeout.is_zero() {
            self.record_failure(backend, FailureCause::InvalidRequest("zero timeout"));
            return InvocationResult::Absent;
        }

        match tokio::time::timeout(timeout, self.attempt(backend, messages, timeout)).await {
            Ok(Ok(response)) => {
                let content = response.content();
                debug!(
                    "Model {} responded ({})",
                    backend,
                    if content.is_some() { "text" } else { "no content" }
                );
                InvocationResult::Success { content }
            }
            Ok(Err(e)) => {
                self.record_failure(backend, FailureCause::from(e));
                InvocationResult::Absent
            }
            Err(_) => {
                self.record_failure(backend, FailureCause::Timeout(timeout));
                InvocationResult::Absent
            }
        }
    }

    /// Call with the timeout parameter; if the backend refuses the parameter
    /// itself, call once more without it.
    async fn attempt(
        &self,
        backend: &BackendId,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<ProviderResponse, TransportError> {
        match self
            .transport
            .complete(backend, messages, Some(timeout))
            .await
        {
            Err(TransportError::UnsupportedParameter(param)) => {
                debug!("Model {} rejected `{}`, retrying without it", backend, param);
                self.transport.complete(backend, messages, None).await
            }
            other => other,
        }
    }

    pub(crate) fn record_failure(&self, backend: &BackendId, cause: FailureCause) {
        self.diagnostics.record(InvocationFailure {
            backend: backend.clone(),
            cause,
        });
    }
}
