//! Function-Call Dispatcher (§4.4): resolves and executes every function
//! call in a model response, merging the results into one function-response
//! event.

use crate::registry::ToolRegistry;
use flowengine_core::{
    merge_all_event_actions, Author, Content, Event, EventActions, FunctionCall, FunctionResponse, InvocationContext, Part, Role, ToolConfirmation, ToolContext,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::Instrument;

/// Dispatch every function call in `calls`, honoring any caller-supplied
/// confirmations keyed by function-call id, and return one merged
/// function-response event (§4.4 "Merging"), or `None` if `calls` is empty.
pub async fn dispatch_function_calls(
    invocation: &InvocationContext,
    registry: &ToolRegistry,
    calls: &[FunctionCall],
    confirmations: &HashMap<String, ToolConfirmation>,
) -> Option<Event> {
    if calls.is_empty() {
        return None;
    }

    let mut futures = Vec::with_capacity(calls.len());
    for fc in calls {
        let confirmation = confirmations.get(&fc.id).cloned();
        futures.push(dispatch_one(invocation, registry, fc, confirmation));
    }
    let results = futures::future::join_all(futures).await;

    let mut parts = Vec::with_capacity(results.len());
    let mut actions = Vec::with_capacity(results.len());
    for (response, call_actions) in results {
        parts.push(Part::FunctionResponse(response));
        actions.push(call_actions);
    }

    let merged_actions = merge_all_event_actions(actions);
    let content = Content { role: Some(Role::User), parts };
    Some(Event::new(invocation.invocation_id.clone(), Author::Agent(invocation.agent.name.clone()), content).with_actions(merged_actions).with_branch(invocation.branch.clone()))
}

async fn dispatch_one(invocation: &InvocationContext, registry: &ToolRegistry, fc: &FunctionCall, confirmation: Option<ToolConfirmation>) -> (FunctionResponse, EventActions) {
    let span = tracing::info_span!("tool_call", tool.name = %fc.name, tool.call_id = %fc.id);
    let span_for_event = span.clone();
    async move {
        let tool_ctx = ToolContext::new(invocation, fc.id.clone(), confirmation);

        let result: Result<Value, String> = match registry.get(&fc.name) {
            None => {
                let available = registry.names().join(", ");
                let message = format!("tool not found: {} (available: {})", fc.name, available);
                recover_tool_error(invocation, &fc.name, &message).await
            }
            Some(tool) => call_tool(invocation, &tool_ctx, tool.as_ref(), fc).await,
        };

        let response_map = match result {
            Ok(value) => as_response_map(value),
            Err(message) => error_map(message),
        };
        let response = FunctionResponse { id: fc.id.clone(), name: fc.name.clone(), response: response_map };
        tracing::debug!(parent: &span_for_event, error = response.is_error(), "tool call completed");
        (response, tool_ctx.take_actions())
    }
    .instrument(span)
    .await
}

async fn call_tool(invocation: &InvocationContext, tool_ctx: &ToolContext, tool: &dyn crate::registry::Tool, fc: &FunctionCall) -> Result<Value, String> {
    if let Err(reason) = validate_args_shape(&tool.input_schema(), &fc.args) {
        let message = format!("invalid arguments for tool {}: {}", fc.name, reason);
        return recover_tool_error(invocation, &fc.name, &message).await;
    }

    let args = Value::Object(fc.args.clone());

    for plugin in invocation.plugins.plugins() {
        if let Some(short_circuit) = plugin.before_tool(&fc.name, &args).await {
            return Ok(short_circuit);
        }
    }

    let mut result = tool.run(tool_ctx, args.clone()).await;
    if let Err(err) = &result {
        if let Some(recovered) = recover_tool_error_value(invocation, &fc.name, err).await {
            result = Ok(recovered);
        }
    }

    let mut result = result;
    for plugin in invocation.plugins.plugins() {
        match &mut result {
            Ok(value) => plugin.after_tool(&fc.name, &args, value).await,
            Err(_) => {}
        }
    }
    result
}

async fn recover_tool_error(invocation: &InvocationContext, tool_name: &str, message: &str) -> Result<Value, String> {
    match recover_tool_error_value(invocation, tool_name, message).await {
        Some(value) => Ok(value),
        None => Err(message.to_string()),
    }
}

async fn recover_tool_error_value(invocation: &InvocationContext, tool_name: &str, message: &str) -> Option<Value> {
    for plugin in invocation.plugins.plugins() {
        if let Some(recovered) = plugin.on_tool_error(tool_name, message).await {
            return Some(recovered);
        }
    }
    None
}

/// Check `args` against `schema`'s declared required keys and property
/// types. A shape check, not full JSON-Schema validation: it looks at
/// `required` and each property's top-level `type` only, and ignores
/// schemas that aren't a plain object (§9 "Any-typed tool args").
fn validate_args_shape(schema: &Value, args: &Map<String, Value>) -> Result<(), String> {
    let Some(schema) = schema.as_object() else { return Ok(()) };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(key) {
                return Err(format!("missing required argument: {key}"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in args {
            let Some(expected) = properties.get(key).and_then(|p| p.get("type")).and_then(Value::as_str) else { continue };
            if !json_type_matches(expected, value) {
                return Err(format!("argument `{key}` should be {expected}"));
            }
        }
    }

    Ok(())
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn as_response_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("output".to_string(), other);
            map
        }
    }
}

fn error_map(message: String) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("error".to_string(), Value::String(message));
    map
}
