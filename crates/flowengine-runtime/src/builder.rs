//! Fluent agent construction. `Agent`'s fields are all public so callers can
//! build one directly, but most of the tree wants sensible defaults with a
//! handful of overrides -- the shape `AgentConfig` took in the donor runtime,
//! just aimed at `Agent` instead of the process-wide engine config.

use flowengine_core::{Agent, ToolDeclaration};
use std::sync::Arc;

pub struct AgentBuilder {
    name: String,
    description: String,
    instruction: String,
    model: Option<String>,
    tools: Vec<ToolDeclaration>,
    output_schema: Option<serde_json::Value>,
    sub_agents: Vec<Arc<Agent>>,
    disallow_transfer_to_parent: bool,
    disallow_transfer_to_peers: bool,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            model: None,
            tools: Vec::new(),
            output_schema: None,
            sub_agents: Vec::new(),
            disallow_transfer_to_parent: false,
            disallow_transfer_to_peers: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn tool(mut self, declaration: ToolDeclaration) -> Self {
        self.tools.push(declaration);
        self
    }

    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn sub_agent(mut self, agent: Arc<Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    /// Opts this agent out of receiving transfers from its sub-agents back
    /// up the tree (§4.7 `transfer_targets`).
    pub fn disallow_transfer_to_parent(mut self) -> Self {
        self.disallow_transfer_to_parent = true;
        self
    }

    /// Opts this agent out of transferring sideways to its siblings (§4.7).
    pub fn disallow_transfer_to_peers(mut self) -> Self {
        self.disallow_transfer_to_peers = true;
        self
    }

    pub fn build(self) -> Arc<Agent> {
        Arc::new(Agent {
            name: self.name,
            description: self.description,
            instruction: self.instruction,
            model: self.model,
            tools: self.tools,
            output_schema: self.output_schema,
            sub_agents: self.sub_agents,
            disallow_transfer_to_parent: self.disallow_transfer_to_parent,
            disallow_transfer_to_peers: self.disallow_transfer_to_peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_leaf_agent_with_defaults() {
        let agent = AgentBuilder::new("calc").model("demo").instruction("add numbers").build();
        assert_eq!(agent.name, "calc");
        assert_eq!(agent.model.as_deref(), Some("demo"));
        assert!(agent.sub_agents.is_empty());
        assert!(!agent.disallow_transfer_to_parent);
    }

    #[test]
    fn builds_a_tree_with_sub_agents() {
        let calc = AgentBuilder::new("calc").model("demo").disallow_transfer_to_parent().build();
        let root = AgentBuilder::new("root").model("demo").sub_agent(calc.clone()).build();
        assert_eq!(root.sub_agents.len(), 1);
        assert_eq!(root.sub_agents[0].name, "calc");
        assert!(root.is_auto_flow());
    }
}
