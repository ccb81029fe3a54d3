//! In-memory fakes for the transport and diagnostics seams (testing only)
//!
//! `ScriptedTransport` replays a per-backend script of replies, failures and
//! delays; `RecordingDiagnostics` keeps every failure record for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::TransportError;
use crate::llm::{
    BackendId, ChatMessage, DiagnosticsSink, InvocationFailure, ModelTransport, ProviderResponse,
};

enum Outcome {
    Reply(ProviderResponse),
    Fail(TransportError),
    Hang,
    Panic(&'static str),
}

/// One scripted call: an outcome delivered after an optional delay
pub struct Step {
    outcome: Outcome,
    delay: Duration,
}

impl Step {
    pub fn reply(response: impl Into<ProviderResponse>) -> Self {
        Self {
            outcome: Outcome::Reply(response.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(error: TransportError) -> Self {
        Self {
            outcome: Outcome::Fail(error),
            delay: Duration::ZERO,
        }
    }

    /// Never completes
    pub fn hang() -> Self {
        Self {
            outcome: Outcome::Hang,
            delay: Duration::ZERO,
        }
    }

    /// Panics inside the transport call
    pub fn panic(message: &'static str) -> Self {
        Self {
            outcome: Outcome::Panic(message),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replies and hangs can be replayed; failures are consumed.
    fn replay(&self) -> Option<Step> {
        let outcome = match &self.outcome {
            Outcome::Reply(response) => Outcome::Reply(response.clone()),
            Outcome::Hang => Outcome::Hang,
            Outcome::Panic(message) => Outcome::Panic(message),
            Outcome::Fail(_) => return None,
        };
        Some(Step {
            outcome,
            delay: self.delay,
        })
    }
}

/// A call observed by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub backend: BackendId,
    pub messages: Vec<ChatMessage>,
    pub timeout: Option<Duration>,
}

/// Transport that answers from per-backend scripts.
///
/// Steps are consumed in order; the final reply (or hang) is repeated for
/// any further calls. Unscripted backends fail with `UnknownRoute`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<BackendId, VecDeque<Step>>>,
    calls: Arc<Mutex<Vec<CallRecord>>>,
    completed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(
        self,
        backend: impl Into<BackendId>,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(backend.into(), steps.into_iter().collect());
        self
    }

    /// Shared log of every call, in arrival order
    pub fn calls(&self) -> Arc<Mutex<Vec<CallRecord>>> {
        Arc::clone(&self.calls)
    }

    /// Number of calls that got past their delay and returned
    pub fn completed(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completed)
    }

    fn next_step(&self, backend: &BackendId) -> Option<Step> {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let steps = scripts.get_mut(backend)?;
        if steps.len() == 1 {
            if let Some(step) = steps.front().and_then(Step::replay) {
                return Some(step);
            }
        }
        steps.pop_front()
    }

    fn missing_step(&self, backend: &BackendId) -> TransportError {
        let scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        if scripts.contains_key(backend) {
            TransportError::Provider {
                status: 500,
                body: "script exhausted".to_string(),
            }
        } else {
            TransportError::UnknownRoute(backend.to_string())
        }
    }
}

#[async_trait::async_trait]
impl ModelTransport for ScriptedTransport {
    async fn complete(
        &self,
        backend: &BackendId,
        messages: &[ChatMessage],
        timeout: Option<Duration>,
    ) -> Result<ProviderResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CallRecord {
                backend: backend.clone(),
                messages: messages.to_vec(),
                timeout,
            });

        let Some(step) = self.next_step(backend) else {
            return Err(self.missing_step(backend));
        };

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        let result = match step.outcome {
            Outcome::Reply(response) => Ok(response),
            Outcome::Fail(error) => Err(error),
            Outcome::Hang => std::future::pending().await,
            Outcome::Panic(message) => panic!("{}", message),
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Sink that keeps every failure it receives
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    failures: Mutex<Vec<InvocationFailure>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<InvocationFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failed_backends(&self) -> Vec<BackendId> {
        self.failures().into_iter().map(|f| f.backend).collect()
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn record(&self, failure: InvocationFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }
}
