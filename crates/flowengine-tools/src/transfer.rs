//! The built-in `transfer_to_agent` tool (§4.7).

use async_trait::async_trait;
use flowengine_core::{transfer_targets, Agent, ParentMap, ToolContext, TRANSFER_TOOL_NAME};
use serde_json::Value;

pub struct TransferToAgentTool {
    targets: Vec<String>,
}

impl TransferToAgentTool {
    /// Build the declaration for agent `a` given the tree's parent map; the
    /// set of legal targets is baked into the enum description so the model
    /// only ever sees names it may actually transfer to (§4.7 "a transfer-
    /// tool declaration and a prompt template enumerating the targets").
    pub fn for_agent(a: &Agent, parents: &ParentMap) -> Self {
        let parent = parents.parent_of(&a.name);
        let mut targets: Vec<String> = transfer_targets(a, parent.map(|p| p.as_ref())).into_iter().collect();
        targets.sort();
        Self { targets }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

#[async_trait]
impl crate::registry::Tool for TransferToAgentTool {
    fn name(&self) -> &str {
        TRANSFER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Transfer control of the conversation to another agent in the tree."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_name": { "type": "string", "enum": self.targets },
            },
            "required": ["agent_name"],
        })
    }

    async fn run(&self, ctx: &ToolContext, args: Value) -> Result<Value, String> {
        let agent_name = args.get("agent_name").and_then(Value::as_str).ok_or_else(|| "agent_name is required".to_string())?;
        if !self.targets.iter().any(|t| t == agent_name) {
            return Err(format!("{agent_name} is not a legal transfer target (allowed: {})", self.targets.join(", ")));
        }
        ctx.transfer_to_agent(agent_name);
        Ok(Value::Object(serde_json::Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use flowengine_core::{InvocationContext, PluginManager};
    use std::sync::Arc;

    fn leaf(name: &str) -> Arc<Agent> {
        Arc::new(Agent {
            name: name.to_string(),
            description: String::new(),
            instruction: String::new(),
            model: Some("demo".to_string()),
            tools: vec![],
            output_schema: None,
            sub_agents: vec![],
            disallow_transfer_to_parent: false,
            disallow_transfer_to_peers: false,
        })
    }

    fn root_with_children(children: Vec<Arc<Agent>>) -> Arc<Agent> {
        Arc::new(Agent {
            name: "root".to_string(),
            description: String::new(),
            instruction: String::new(),
            model: Some("demo".to_string()),
            tools: vec![],
            output_schema: None,
            sub_agents: children,
            disallow_transfer_to_parent: false,
            disallow_transfer_to_peers: false,
        })
    }

    #[tokio::test]
    async fn run_rejects_illegal_target() {
        let calc = leaf("calc");
        let root = root_with_children(vec![calc.clone()]);
        let parents = ParentMap::build(&root);
        let tool = TransferToAgentTool::for_agent(&calc, &parents);

        let session = Arc::new(crate::dispatcher::tests_support::MemorySession::default());
        let invocation = InvocationContext::new(calc.clone(), session, Arc::new(PluginManager::new()));
        let ctx = ToolContext::new(&invocation, "call-1".to_string(), None);

        let err = tool.run(&ctx, serde_json::json!({"agent_name": "nonexistent"})).await.unwrap_err();
        assert!(err.contains("not a legal transfer target"));
    }

    #[tokio::test]
    async fn run_accepts_legal_target_s5() {
        let calc = leaf("calc");
        let root = root_with_children(vec![calc.clone()]);
        let parents = ParentMap::build(&root);
        let tool = TransferToAgentTool::for_agent(&root, &parents);
        assert!(tool.targets().contains(&"calc".to_string()));

        let session = Arc::new(crate::dispatcher::tests_support::MemorySession::default());
        let invocation = InvocationContext::new(root.clone(), session, Arc::new(PluginManager::new()));
        let ctx = ToolContext::new(&invocation, "call-1".to_string(), None);

        tool.run(&ctx, serde_json::json!({"agent_name": "calc"})).await.unwrap();
        let actions = ctx.take_actions();
        assert_eq!(actions.transfer_to_agent, Some("calc".to_string()));
    }
}
