//! Content model, event log, layered state, and agent tree shared by every
//! other crate in the workspace — the leaf layer of the design (§2).

pub mod agent;
pub mod content;
pub mod context;
pub mod error;
pub mod event;
pub mod state;

pub use agent::{transfer_targets, Agent, LlmCapable, ParentMap};
pub use content::*;
pub use context::{ArtifactStore, InvocationContext, MemoryEntry, MemoryStore, Plugin, PluginManager, RunConfig, SessionStore, ToolContext};
pub use error::{FlowError, Result};
pub use event::{merge_all_event_actions, merge_event_actions, ArtifactDeltaEntry, Author, Event, EventActions, ToolConfirmation};
pub use state::State;
