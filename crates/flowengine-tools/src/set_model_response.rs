//! The synthetic `set_model_response` tool (§4.9 Output-Schema Enforcement).

use async_trait::async_trait;
use flowengine_core::{ToolContext, SET_MODEL_RESPONSE_TOOL_NAME};
use serde_json::Value;

/// Injected when an agent has an output schema, has any tools, and the
/// target model can't natively enforce structured output alongside tools
/// (`ModelAdapter::supports_native_schema_with_tools` is false).
pub struct SetModelResponseTool {
    schema: Value,
}

impl SetModelResponseTool {
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl crate::registry::Tool for SetModelResponseTool {
    fn name(&self) -> &str {
        SET_MODEL_RESPONSE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Call this with your final answer, matching the required output schema."
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    /// Validation here is the dispatcher-boundary schema-shape check (§9
    /// "Any-typed tool args"): the tool simply echoes its args back as the
    /// validated payload, since the dispatcher already shape-checked them
    /// against `input_schema()` before calling `run`.
    async fn run(&self, _ctx: &ToolContext, args: Value) -> Result<Value, String> {
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use flowengine_core::{Agent, InvocationContext, PluginManager};
    use std::sync::Arc;

    #[tokio::test]
    async fn run_echoes_payload_as_validated_output_s7() {
        let schema = serde_json::json!({"type": "object", "properties": {"answer": {"type": "string"}}});
        let tool = SetModelResponseTool::new(schema);

        let agent = Arc::new(Agent {
            name: "root".to_string(),
            description: String::new(),
            instruction: String::new(),
            model: Some("demo".to_string()),
            tools: vec![],
            output_schema: None,
            sub_agents: vec![],
            disallow_transfer_to_parent: true,
            disallow_transfer_to_peers: true,
        });
        let session = Arc::new(crate::dispatcher::tests_support::MemorySession::default());
        let invocation = InvocationContext::new(agent, session, Arc::new(PluginManager::new()));
        let ctx = ToolContext::new(&invocation, "call-1".to_string(), None);

        let result = tool.run(&ctx, serde_json::json!({"answer": "42"})).await.unwrap();
        assert_eq!(result, serde_json::json!({"answer": "42"}));
    }
}
