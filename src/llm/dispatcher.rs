//! Concurrent fan-out of one conversation to many backends

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DuplicatePolicy;
use crate::llm::{BackendId, BackendInvoker, ChatMessage, FailureCause, InvocationResult};

/// One entry per requested backend, whether it answered or not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DispatchResult {
    entries: HashMap<BackendId, InvocationResult>,
}

impl DispatchResult {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn insert(&mut self, backend: BackendId, result: InvocationResult) {
        self.entries.insert(backend, result);
    }

    pub fn get(&self, backend: &BackendId) -> Option<&InvocationResult> {
        self.entries.get(backend)
    }

    pub fn contains(&self, backend: &BackendId) -> bool {
        self.entries.contains_key(backend)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BackendId, &InvocationResult)> {
        self.entries.iter()
    }

    /// Backends that answered, including those whose answer had no text
    pub fn responded(&self) -> impl Iterator<Item = (&BackendId, Option<&str>)> {
        self.entries
            .iter()
            .filter(|(_, result)| result.is_success())
            .map(|(backend, result)| (backend, result.content()))
    }

    /// Backends that failed, sorted by id
    pub fn absent(&self) -> Vec<&BackendId> {
        let mut absent: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, result)| result.is_absent())
            .map(|(backend, _)| backend)
            .collect();
        absent.sort();
        absent
    }

    /// Non-empty answers, sorted by backend id
    pub fn contents(&self) -> Vec<(&BackendId, &str)> {
        let mut contents: Vec<_> = self
            .responded()
            .filter_map(|(backend, content)| content.map(|text| (backend, text)))
            .collect();
        contents.sort_by(|a, b| a.0.cmp(b.0));
        contents
    }

    pub fn into_inner(self) -> HashMap<BackendId, InvocationResult> {
        self.entries
    }
}

impl IntoIterator for DispatchResult {
    type Item = (BackendId, InvocationResult);
    type IntoIter = std::collections::hash_map::IntoIter<BackendId, InvocationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Sends one conversation to every backend at once and waits for all of them
pub struct CouncilDispatcher {
    invoker: Arc<BackendInvoker>,
    duplicates: DuplicatePolicy,
}

impl CouncilDispatcher {
    pub fn new(invoker: BackendInvoker) -> Self {
        Self {
            invoker: Arc::new(invoker),
            duplicates: DuplicatePolicy::default(),
        }
    }

    pub fn with_duplicate_policy(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn invoker(&self) -> &BackendInvoker {
        &self.invoker
    }

    /// Query every backend concurrently and return once all have settled.
    pub async fn dispatch_all(
        &self,
        backends: &[BackendId],
        messages: &[ChatMessage],
    ) -> DispatchResult {
        self.dispatch_all_with_cancellation(backends, messages, CancellationToken::new())
            .await
    }

    /// Like [`dispatch_all`](Self::dispatch_all), but cancelling `cancellation`
    /// stops every call still in flight. Cancelled backends are reported as
    /// [`InvocationResult::Absent`]; the result still has one entry per backend.
    pub async fn dispatch_all_with_cancellation(
        &self,
        backends: &[BackendId],
        messages: &[ChatMessage],
        cancellation: CancellationToken,
    ) -> DispatchResult {
        if backends.is_empty() {
            return DispatchResult::default();
        }

        let targets = self.targets(backends);
        debug!("Dispatching to {} council members", targets.len());

        let messages: Arc<[ChatMessage]> = Arc::from(messages);
        let mut join_set = JoinSet::new();
        let mut slots = HashMap::with_capacity(targets.len());
        for (slot, backend) in targets.iter().enumerate() {
            let handle = join_set.spawn(Self::invocation(
                Arc::clone(&self.invoker),
                backend.clone(),
                Arc::clone(&messages),
                cancellation.clone(),
            ));
            slots.insert(handle.id(), slot);
        }

        // Dropping the join set aborts whatever is still running
        let mut outcomes: Vec<Option<InvocationResult>> = vec![None; targets.len()];
        while let Some(joined) = join_set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    let id = e.id();
                    if let Some(&slot) = slots.get(&id) {
                        self.invoker
                            .record_failure(&targets[slot], FailureCause::Aborted(e.to_string()));
                    }
                    (id, InvocationResult::Absent)
                }
            };
            if let Some(&slot) = slots.get(&id) {
                outcomes[slot] = Some(result);
            }
        }

        let mut results = DispatchResult::with_capacity(targets.len());
        for (backend, outcome) in targets.into_iter().zip(outcomes) {
            // Later duplicates replace earlier ones
            results.insert(backend, outcome.unwrap_or(InvocationResult::Absent));
        }

        info!(
            "{}/{} council members responded",
            results.responded().count(),
            results.len()
        );
        results
    }

    fn targets(&self, backends: &[BackendId]) -> Vec<BackendId> {
        match self.duplicates {
            DuplicatePolicy::Overwrite => backends.to_vec(),
            DuplicatePolicy::Deduplicate => {
                let mut seen = HashSet::with_capacity(backends.len());
                backends
                    .iter()
                    .filter(|backend| seen.insert(*backend))
                    .cloned()
                    .collect()
            }
        }
    }

    async fn invocation(
        invoker: Arc<BackendInvoker>,
        backend: BackendId,
        messages: Arc<[ChatMessage]>,
        cancellation: CancellationToken,
    ) -> InvocationResult {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                invoker.record_failure(&backend, FailureCause::Cancelled);
                InvocationResult::Absent
            }
            result = invoker.invoke(&backend, &messages) => result,
        }
    }
}
