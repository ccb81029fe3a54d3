//! LLM backends and council dispatch

mod council;
mod diagnostics;
mod dispatcher;
pub mod fakes;
mod invoker;
mod message;
mod provider;
mod response;

pub use council::*;
pub use diagnostics::*;
pub use dispatcher::*;
pub use invoker::*;
pub use message::*;
pub use provider::*;
pub use response::*;
