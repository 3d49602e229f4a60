//! A small example binary that exercises the flow engine end-to-end
//! against the in-tree `SequencedModel`, the way a production adapter
//! would be wired in, just without a network call behind it.

use flowengine_core::{Author, Content, Event, FunctionCall, InvocationContext, LlmResponse, PluginManager, Role};
use flowengine_model::SequencedModel;
use flowengine_runtime::{AgentBuilder, FlowDriver, ModelRegistry};
use flowengine_tools::{Tool, ToolRegistry};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;

struct GetWeather;

#[async_trait::async_trait]
impl Tool for GetWeather {
    fn name(&self) -> &str {
        "get_weather"
    }
    fn description(&self) -> &str {
        "returns the current weather for a city"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]})
    }
    async fn run(&self, _ctx: &flowengine_core::ToolContext, args: Value) -> Result<Value, String> {
        let city = args.get("city").and_then(Value::as_str).unwrap_or("somewhere");
        tracing::info!(city, "looked up weather");
        Ok(json!({"city": city, "forecast": "sunny", "high_f": 72}))
    }
}

fn text_response(text: &str) -> LlmResponse {
    LlmResponse { content: Some(Content::text(Role::Model, text)), ..Default::default() }
}

fn call_response(name: &str, args: Map<String, Value>) -> LlmResponse {
    LlmResponse { content: Some(Content::new(Role::Model, vec![flowengine_core::Part::FunctionCall(FunctionCall::new(name, args))])), ..Default::default() }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "flowengine=info".into()))
        .init();

    let agent = AgentBuilder::new("assistant")
        .description("Answers questions and checks the weather.")
        .instruction("You are a helpful assistant. Use get_weather when asked about the weather.")
        .model("scripted")
        .tool(GetWeather.to_declaration())
        .disallow_transfer_to_parent()
        .disallow_transfer_to_peers()
        .build();

    let mut call_args = Map::new();
    call_args.insert("city".to_string(), json!("Boston"));
    let model = Arc::new(SequencedModel::new(
        "scripted",
        vec![vec![call_response("get_weather", call_args)], vec![text_response("It's sunny and 72°F in Boston.")]],
    ));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(GetWeather))?;

    let mut models = ModelRegistry::new();
    models.register(model);

    let driver = FlowDriver::new(agent.clone(), tools, models);

    let session: Arc<dyn flowengine_core::SessionStore> = Arc::new(flowengine_runtime::InMemorySession::new());
    let invocation = InvocationContext::new(agent, session.clone(), Arc::new(PluginManager::new()));
    session
        .append(Event::new(invocation.invocation_id.clone(), Author::User, Content::text(Role::User, "What's the weather in Boston?")))
        .await;

    let mut stream = driver.run(invocation);
    while let Some(event) = stream.next().await {
        print_event(&event?);
    }

    Ok(())
}

fn print_event(event: &Event) {
    let author = event.author.as_str();
    if let Some(text) = event.content.parts.first().and_then(|p| p.text_str()) {
        println!("{author}: {text}");
        return;
    }
    for call in event.content.function_calls() {
        println!("{author} -> call {}({})", call.name, Value::Object(call.args.clone()));
    }
    for response in event.content.function_responses() {
        println!("{author} <- {} returned {}", response.name, Value::Object(response.response.clone()));
    }
}
