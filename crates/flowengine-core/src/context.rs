//! Invocation Context (§2 layer 2) and the external-interface contracts it
//! carries (§6): session store, artifact store, memory store, plugin
//! manager. Concrete implementations live in `flowengine-runtime`; this
//! module only fixes the trait boundary so both the dispatcher (in
//! `flowengine-tools`) and the flow driver (in `flowengine-runtime`) can
//! depend on one shared shape.

use crate::agent::Agent;
use crate::event::{Event, EventActions, ToolConfirmation};
use crate::state::State;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// `Save(name, part) -> version`, `Load(name) -> part` (§6).
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, name: &str, part: Value) -> crate::Result<u64>;
    async fn load(&self, name: &str) -> Option<Value>;
}

/// One memory search hit (§6).
#[derive(Clone, Debug)]
pub struct MemoryEntry {
    pub author: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub content: String,
}

/// `Search(ctx, query) -> SearchResponse{memories: ...}` (§6).
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    async fn search(&self, query: &str) -> crate::Result<Vec<MemoryEntry>>;
}

/// Create/Get/Append(event) plus a read-only/write-through state view (§6).
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, event: Event);
    async fn events(&self) -> Vec<Event>;
    fn state(&self) -> Arc<Mutex<State>>;
}

/// A layered callback/plugin system that can intercept before/after model
/// and tool calls and short-circuit them (§2). Each hook returns `None` to
/// let the call proceed unmodified.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    async fn before_model(&self, _req: &crate::LlmRequest) -> Option<crate::LlmResponse> {
        None
    }
    async fn after_model(&self, _resp: &crate::LlmResponse) -> Option<crate::LlmResponse> {
        None
    }
    async fn on_model_error(&self, _err: &str) -> Option<crate::LlmResponse> {
        None
    }
    async fn before_tool(&self, _name: &str, _args: &Value) -> Option<Value> {
        None
    }
    async fn after_tool(&self, _name: &str, _args: &Value, _result: &mut Value) {}
    async fn on_tool_error(&self, _name: &str, _err: &str) -> Option<Value> {
        None
    }
}

#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }
}

/// The caller's pre-supplied answers to outstanding tool confirmations, and
/// a few run-wide toggles.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub streaming: bool,
    pub max_iterations: usize,
}

impl RunConfig {
    pub fn new() -> Self {
        Self { streaming: true, max_iterations: 25 }
    }
}

/// The per-request ambient record every step of the flow carries (§2, §3
/// ownership note: "an invocation exclusively owns its InvocationContext").
pub struct InvocationContext {
    pub invocation_id: String,
    pub branch: Option<String>,
    pub agent: Arc<Agent>,
    pub session: Arc<dyn SessionStore>,
    pub artifacts: Option<Arc<dyn ArtifactStore>>,
    pub memory: Option<Arc<dyn MemoryStore>>,
    pub run_config: RunConfig,
    pub cancellation: CancellationToken,
    pub plugins: Arc<PluginManager>,
    end_invocation: AtomicBool,
}

impl InvocationContext {
    pub fn new(agent: Arc<Agent>, session: Arc<dyn SessionStore>, plugins: Arc<PluginManager>) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            branch: None,
            agent,
            session,
            artifacts: None,
            memory: None,
            run_config: RunConfig::new(),
            cancellation: CancellationToken::new(),
            plugins,
            end_invocation: AtomicBool::new(false),
        }
    }

    /// Set by a request processor to stop the flow before calling the model
    /// (§4.1 step 4).
    pub fn end_invocation(&self) {
        self.end_invocation.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.end_invocation.load(Ordering::SeqCst)
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn with_agent(&self, agent: Arc<Agent>) -> Self {
        Self {
            invocation_id: self.invocation_id.clone(),
            branch: self.branch.clone(),
            agent,
            session: self.session.clone(),
            artifacts: self.artifacts.clone(),
            memory: self.memory.clone(),
            run_config: self.run_config.clone(),
            cancellation: self.cancellation.clone(),
            plugins: self.plugins.clone(),
            end_invocation: AtomicBool::new(false),
        }
    }
}

/// The per-call context handed to a tool (§4.4 step 1): a fresh
/// `EventActions` with its own state-delta, the resolved function-call id,
/// and any confirmation the caller supplied for this call.
pub struct ToolContext {
    pub function_call_id: String,
    pub invocation_id: String,
    pub agent_name: String,
    pub branch: Option<String>,
    pub confirmation: Option<ToolConfirmation>,
    pub cancellation: CancellationToken,
    actions: Mutex<EventActions>,
}

impl ToolContext {
    pub fn new(invocation: &InvocationContext, function_call_id: String, confirmation: Option<ToolConfirmation>) -> Self {
        Self {
            function_call_id,
            invocation_id: invocation.invocation_id.clone(),
            agent_name: invocation.agent.name.clone(),
            branch: invocation.branch.clone(),
            confirmation,
            cancellation: invocation.cancellation.clone(),
            actions: Mutex::new(EventActions::default()),
        }
    }

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.actions.lock().expect("tool actions mutex poisoned").state_delta.insert(key.into(), value);
    }

    /// A tool pauses the invocation by requesting confirmation (§4.6).
    pub fn request_confirmation(&self, hint: impl Into<String>, payload: Value) {
        let mut actions = self.actions.lock().expect("tool actions mutex poisoned");
        actions.skip_summarization = true;
        actions
            .requested_tool_confirmations
            .insert(self.function_call_id.clone(), ToolConfirmation::unconfirmed(hint, payload));
    }

    pub fn transfer_to_agent(&self, agent_name: impl Into<String>) {
        self.actions.lock().expect("tool actions mutex poisoned").transfer_to_agent = Some(agent_name.into());
    }

    /// Snapshot the actions accumulated during this call (§4.4 step 4).
    pub fn take_actions(&self) -> EventActions {
        std::mem::take(&mut *self.actions.lock().expect("tool actions mutex poisoned"))
    }
}
