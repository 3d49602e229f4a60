//! The runtime crate: wires the Processor Pipeline, instruction
//! substitution, in-memory sessions and the Flow Driver together into one
//! running engine (§2 layers 4/8, §4.1-§4.2, §4.6, §4.8, §6).

pub mod builder;
pub mod flow;
pub mod instruction;
pub mod pipeline;
pub mod session;

pub use builder::AgentBuilder;
pub use flow::{FlowDriver, ModelRegistry};
pub use instruction::substitute_instruction;
pub use pipeline::{ProcessorPipeline, RequestProcessor, ResponseProcessor};
pub use session::{InMemorySession, SessionRegistry};
