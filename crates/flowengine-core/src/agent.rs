//! The agent tree and agent transfer target computation (§3 `Agent`, §4.7,
//! §9 "Cyclic agent references").

use crate::content::ToolDeclaration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An agent node. Constructed by the application and shared read-only by
/// the core; sub-agents are owned, the parent link is derived rather than
/// stored, per §9's guidance to avoid back-pointers/cycles in the value.
#[derive(Debug)]
pub struct Agent {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub model: Option<String>,
    pub tools: Vec<ToolDeclaration>,
    pub output_schema: Option<serde_json::Value>,
    pub sub_agents: Vec<Arc<Agent>>,
    pub disallow_transfer_to_parent: bool,
    pub disallow_transfer_to_peers: bool,
}

impl Agent {
    /// An agent "uses auto-flow" iff it has sub-agents or either disallow
    /// flag is false (§4.7).
    pub fn is_auto_flow(&self) -> bool {
        !self.sub_agents.is_empty() || !self.disallow_transfer_to_parent || !self.disallow_transfer_to_peers
    }
}

/// Capability view the flow needs from an agent participating in LLM flows
/// (§9 "Duck-typed LLMAgent capability"). `Agent` always implements it;
/// kept as a separate trait so the flow driver itself doesn't need to know
/// about `Agent`'s concrete field layout.
pub trait LlmCapable {
    fn name(&self) -> &str;
    fn model(&self) -> Option<&str>;
    fn instruction(&self) -> &str;
    fn tool_declarations(&self) -> &[ToolDeclaration];
    fn output_schema(&self) -> Option<&serde_json::Value>;
}

impl LlmCapable for Agent {
    fn name(&self) -> &str {
        &self.name
    }
    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
    fn instruction(&self) -> &str {
        &self.instruction
    }
    fn tool_declarations(&self) -> &[ToolDeclaration] {
        &self.tools
    }
    fn output_schema(&self) -> Option<&serde_json::Value> {
        self.output_schema.as_ref()
    }
}

/// A one-time computed map from agent name to parent name, built at
/// invocation start by walking the tree from its root (§9).
#[derive(Debug, Default)]
pub struct ParentMap {
    parent_of: HashMap<String, String>,
    by_name: HashMap<String, Arc<Agent>>,
}

impl ParentMap {
    pub fn build(root: &Arc<Agent>) -> Self {
        let mut map = Self::default();
        map.by_name.insert(root.name.clone(), root.clone());
        map.walk(root);
        map
    }

    fn walk(&mut self, node: &Arc<Agent>) {
        for child in &node.sub_agents {
            self.parent_of.insert(child.name.clone(), node.name.clone());
            self.by_name.insert(child.name.clone(), child.clone());
            self.walk(child);
        }
    }

    pub fn parent_of(&self, name: &str) -> Option<&Arc<Agent>> {
        self.parent_of.get(name).and_then(|p| self.by_name.get(p))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Agent>> {
        self.by_name.get(name)
    }
}

/// Compute the legal transfer targets for agent `a` given its parent `p`
/// (§4.7). Pure function over the tree, exercised directly by
/// testable-property #6.
pub fn transfer_targets(a: &Agent, parent: Option<&Agent>) -> HashSet<String> {
    let mut targets: HashSet<String> = a.sub_agents.iter().map(|s| s.name.clone()).collect();

    if let Some(p) = parent {
        if !a.disallow_transfer_to_parent {
            targets.insert(p.name.clone());
        }
        if p.is_auto_flow() && !a.disallow_transfer_to_peers {
            for sibling in &p.sub_agents {
                if sibling.name != a.name {
                    targets.insert(sibling.name.clone());
                }
            }
        }
    }

    targets
}
