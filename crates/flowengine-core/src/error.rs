//! Error taxonomy for the flow engine (§7 of the design).
//!
//! Kinds mirror the spec's taxonomy rather than implementation classes:
//! configuration errors are fatal at step start, processor errors abort a
//! step, model errors are routed through callbacks before they reach here,
//! tool errors never reach here at all (they are folded into a
//! `FunctionResponse`), and stream-invariant violations are fatal to the
//! whole invocation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("no model configured for agent {agent}")]
    ModelNotConfigured { agent: String },

    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("request processor {processor} failed: {source}")]
    Processor {
        processor: String,
        #[source]
        source: Box<FlowError>,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("confirmation payload could not be decoded: {0}")]
    ConfirmationDecode(#[from] serde_json::Error),

    #[error("stream ended on an unterminated partial response")]
    UnterminatedStream,

    #[error("transfer target {target} is not a legal transfer from {from}")]
    IllegalTransfer { from: String, target: String },

    #[error("unresolved required state key: {0}")]
    UnresolvedStateKey(String),

    #[error("missing required artifact: {0}")]
    MissingArtifact(String),

    #[error("invocation was cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    pub fn processor(name: impl Into<String>, source: FlowError) -> Self {
        Self::Processor {
            processor: name.into(),
            source: Box::new(source),
        }
    }

    pub fn illegal_transfer(from: impl Into<String>, target: impl Into<String>) -> Self {
        Self::IllegalTransfer {
            from: from.into(),
            target: target.into(),
        }
    }
}
