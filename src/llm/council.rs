//! LLM Council - the configured set of backends queried for every prompt

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm::{
    BackendId, BackendInvoker, ChatMessage, CouncilDispatcher, DispatchResult, HttpTransport,
    ModelTransport,
};

/// Council of LLM backends sharing one dispatcher
pub struct Council {
    members: Vec<BackendId>,
    chairman: BackendId,
    title_model: BackendId,
    data_dir: PathBuf,
    dispatcher: CouncilDispatcher,
}

impl Council {
    /// Council over an arbitrary transport
    pub fn new(config: &Config, transport: Arc<dyn ModelTransport>) -> Self {
        let invoker = BackendInvoker::new(transport).with_timeout(config.timeout());
        Self::with_invoker(config, invoker)
    }

    /// Council talking to the configured OpenAI-compatible providers
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_invoker(config: &Config, invoker: BackendInvoker) -> Self {
        let dispatcher =
            CouncilDispatcher::new(invoker).with_duplicate_policy(config.council.duplicates);

        Self {
            members: config.council_members(),
            chairman: config.chairman(),
            title_model: config.title_model(),
            data_dir: config.storage.data_dir.clone(),
            dispatcher,
        }
    }

    pub fn members(&self) -> &[BackendId] {
        &self.members
    }

    pub fn chairman(&self) -> &BackendId {
        &self.chairman
    }

    pub fn title_model(&self) -> &BackendId {
        &self.title_model
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn dispatcher(&self) -> &CouncilDispatcher {
        &self.dispatcher
    }

    /// Ask every council member
    pub async fn query(&self, messages: &[ChatMessage]) -> DispatchResult {
        self.dispatcher.dispatch_all(&self.members, messages).await
    }

    /// Ask every council member until `cancellation` fires
    pub async fn query_with_cancellation(
        &self,
        messages: &[ChatMessage],
        cancellation: CancellationToken,
    ) -> DispatchResult {
        self.dispatcher
            .dispatch_all_with_cancellation(&self.members, messages, cancellation)
            .await
    }
}
