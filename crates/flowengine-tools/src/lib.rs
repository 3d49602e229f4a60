//! Tool registry, the function-call dispatcher, the confirmation processor,
//! and the two built-in sentinel tools (`transfer_to_agent`,
//! `set_model_response`) (§4.4, §4.6, §4.7, §4.9).

pub mod confirmation;
pub mod dispatcher;
pub mod registry;
pub mod set_model_response;
pub mod transfer;

pub use confirmation::{resume_confirmations, resumed_calls_to_content, ResumedCall};
pub use dispatcher::dispatch_function_calls;
pub use registry::{Tool, ToolRegistry, Toolset};
pub use set_model_response::SetModelResponseTool;
pub use transfer::TransferToAgentTool;
