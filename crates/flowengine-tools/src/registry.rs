//! The `Tool` trait and the name->tool registry the dispatcher consults
//! (§3 `Agent.tools`, §4.4, GLOSSARY "Tool"/"Toolset").

use async_trait::async_trait;
use flowengine_core::{ToolContext, ToolDeclaration};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// An externally defined, callable capability (GLOSSARY "Tool").
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Tools whose completion is reported back as "long running" (§4.1 step
    /// 5d) rather than awaited inline — the confirmation sentinel is the one
    /// built-in example.
    fn is_long_running(&self) -> bool {
        false
    }

    fn to_declaration(&self) -> ToolDeclaration {
        ToolDeclaration { name: self.name().to_string(), description: self.description().to_string(), parameters: self.input_schema() }
    }

    /// Errors returned here are folded into `{"error": message}` by the
    /// dispatcher (§7) — they never propagate to the caller directly.
    async fn run(&self, ctx: &ToolContext, args: Value) -> Result<Value, String>;
}

/// A container that lazily produces a set of tools (GLOSSARY "Toolset"),
/// e.g. a remote MCP server reached through a connection opened on first use.
#[async_trait]
pub trait Toolset: Send + Sync {
    async fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, erroring on a duplicate name (§7 "Configuration
    /// errors" includes "duplicate tool name").
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> flowengine_core::Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(flowengine_core::FlowError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|t| t.to_declaration()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    /// Clone this registry's entries into a fresh one with `tool` inserted,
    /// overwriting any existing entry of the same name. Used to build a
    /// per-step working registry that layers in the agent-specific transfer
    /// and structured-output sentinel tools (§4.1 step 3, §4.7, §4.9) without
    /// mutating the shared base registry.
    pub fn with_additional(&self, tool: Arc<dyn Tool>) -> Self {
        let mut tools = self.tools.clone();
        tools.insert(tool.name().to_string(), tool);
        Self { tools }
    }
}

impl Clone for ToolRegistry {
    fn clone(&self) -> Self {
        Self { tools: self.tools.clone() }
    }
}
