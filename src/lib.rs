//! llm-council - ask a council of LLM backends the same question
//!
//! A [`Council`](llm::Council) fans one conversation out to every configured
//! backend at once. Each backend call runs under its own timeout, failures
//! are absorbed per backend, and the caller always gets back one entry per
//! council member.

pub mod config;
pub mod error;
pub mod llm;

pub use config::{Config, DuplicatePolicy};
pub use error::{CouncilError, Result, TransportError};
pub use llm::{
    BackendId, BackendInvoker, ChatMessage, Council, CouncilDispatcher, DispatchResult,
    InvocationResult, Role,
};
