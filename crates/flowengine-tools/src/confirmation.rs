//! Confirmation (HITL) Processor (§4.6): resumes outstanding tool calls
//! whose confirmation the user answered on a later turn.
//!
//! Implemented as a single forward pass over the event log keyed by
//! function-call id, replacing the nested backward scan (§9 open question,
//! resolved as "replace" — same observable behavior, better complexity).

use flowengine_core::{Author, Content, FunctionCall, ToolConfirmation, CONFIRMATION_TOOL_NAME};
use serde_json::Value;
use std::collections::HashMap;

/// One outstanding tool call whose confirmation has now arrived, ready to
/// be re-dispatched.
pub struct ResumedCall {
    pub original_call: FunctionCall,
    pub confirmation: ToolConfirmation,
}

/// Scan `events` (oldest first) and return the outstanding calls to resume,
/// or an empty vec if there is nothing to resume (§4.6 steps 1-4).
pub fn resume_confirmations(events: &[flowengine_core::Event]) -> flowengine_core::Result<Vec<ResumedCall>> {
    let mut pending_requests: HashMap<String, FunctionCall> = HashMap::new();
    let mut confirmed: HashMap<String, ToolConfirmation> = HashMap::new();
    let mut answered_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

    for event in events {
        if let Author::Agent(_) = &event.author {
            for fc in event.content.function_calls() {
                if fc.name == CONFIRMATION_TOOL_NAME {
                    if let Some(original) = decode_sentinel_call(fc)? {
                        pending_requests.insert(fc.id.clone(), original);
                    }
                }
            }
        }

        for fr in event.content.function_responses() {
            if fr.name == CONFIRMATION_TOOL_NAME {
                if let Some(original) = pending_requests.get(&fr.id) {
                    let decision = decode_confirmation_response(&fr.response)?;
                    confirmed.insert(original.id.clone(), decision);
                }
            } else {
                // A non-sentinel response means that original call already
                // completed; it is no longer outstanding (step 4).
                answered_ids.insert(fr.id.clone());
            }
        }
    }

    let mut resumed = Vec::new();
    for (_, request) in pending_requests {
        if answered_ids.contains(&request.id) {
            continue;
        }
        if let Some(confirmation) = confirmed.remove(&request.id) {
            resumed.push(ResumedCall { original_call: request, confirmation });
        }
    }
    resumed.sort_by(|a, b| a.original_call.id.cmp(&b.original_call.id));
    Ok(resumed)
}

fn decode_sentinel_call(fc: &FunctionCall) -> flowengine_core::Result<Option<FunctionCall>> {
    let Some(original_value) = fc.args.get("originalFunctionCall") else {
        return Ok(None);
    };
    let original: FunctionCall = serde_json::from_value(original_value.clone())?;
    Ok(Some(original))
}

/// Decode a confirmation FunctionResponse, which may be wire-encoded as a
/// direct map or as a single-key `{response: "<json>"}` envelope (§6).
fn decode_confirmation_response(response: &serde_json::Map<String, Value>) -> flowengine_core::Result<ToolConfirmation> {
    if let Some(Value::String(encoded)) = response.get("response") {
        let decoded: ToolConfirmation = serde_json::from_str(encoded)?;
        return Ok(decoded);
    }
    let value = Value::Object(response.clone());
    let confirmed = value.get("confirmed").and_then(Value::as_bool).unwrap_or(false);
    Ok(ToolConfirmation { hint: String::new(), confirmed, payload: value })
}

/// Build the synthetic model content for a resumed confirmation batch: one
/// `FunctionCall` per resumed original call, role=model (§4.6 step 5
/// precursor — the dispatcher expects model-authored function calls).
pub fn resumed_calls_to_content(resumed: &[ResumedCall]) -> Content {
    Content {
        role: Some(flowengine_core::Role::Model),
        parts: resumed.iter().map(|r| flowengine_core::Part::FunctionCall(r.original_call.clone())).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_core::{Event, FunctionResponse, Part};
    use serde_json::{json, Map};

    fn sentinel_event(original: &FunctionCall, sentinel_id: &str) -> Event {
        let mut args = Map::new();
        args.insert("originalFunctionCall".to_string(), serde_json::to_value(original).unwrap());
        args.insert(
            "toolConfirmation".to_string(),
            serde_json::to_value(ToolConfirmation::unconfirmed("confirm?", Value::Null)).unwrap(),
        );
        let sentinel = FunctionCall { id: sentinel_id.to_string(), name: CONFIRMATION_TOOL_NAME.to_string(), args };
        Event::new("inv", Author::Agent("root".to_string()), Content { role: Some(flowengine_core::Role::Model), parts: vec![Part::FunctionCall(sentinel)] })
            .with_long_running_tool_ids(vec![sentinel_id.to_string()])
    }

    fn confirmation_response_event(sentinel_id: &str, confirmed: bool) -> Event {
        let mut response = Map::new();
        response.insert("confirmed".to_string(), Value::Bool(confirmed));
        let fr = FunctionResponse { id: sentinel_id.to_string(), name: CONFIRMATION_TOOL_NAME.to_string(), response };
        Event::new("inv", Author::User, Content { role: Some(flowengine_core::Role::User), parts: vec![Part::FunctionResponse(fr)] })
    }

    #[test]
    fn no_confirmation_events_yields_nothing_to_resume() {
        let events = vec![Event::new("inv", Author::User, Content::text(flowengine_core::Role::User, "hi"))];
        let resumed = resume_confirmations(&events).unwrap();
        assert!(resumed.is_empty());
    }

    #[test]
    fn answered_confirmation_resumes_the_original_call_s4() {
        let original = FunctionCall::new("delete", Map::new());
        let original = FunctionCall { id: "adk-1".to_string(), ..original };
        let events = vec![sentinel_event(&original, "adk-conf-1"), confirmation_response_event("adk-conf-1", true)];
        let resumed = resume_confirmations(&events).unwrap();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].original_call.id, "adk-1");
        assert!(resumed[0].confirmation.confirmed);
    }

    #[test]
    fn already_answered_call_is_not_resumed() {
        let original = FunctionCall { id: "adk-1".to_string(), ..FunctionCall::new("delete", Map::new()) };
        let already_done = FunctionResponse::output("adk-1", "delete", json!({"ok": true}));
        let events = vec![
            sentinel_event(&original, "adk-conf-1"),
            confirmation_response_event("adk-conf-1", true),
            Event::new("inv", Author::Agent("root".to_string()), Content { role: Some(flowengine_core::Role::User), parts: vec![Part::FunctionResponse(already_done)] }),
        ];
        let resumed = resume_confirmations(&events).unwrap();
        assert!(resumed.is_empty());
    }

    #[test]
    fn envelope_encoded_confirmation_decodes() {
        let original = FunctionCall { id: "adk-1".to_string(), ..FunctionCall::new("delete", Map::new()) };
        let events = vec![
            sentinel_event(&original, "adk-conf-1"),
            {
                let payload = serde_json::to_string(&ToolConfirmation { hint: String::new(), confirmed: true, payload: Value::Null }).unwrap();
                let mut response = Map::new();
                response.insert("response".to_string(), Value::String(payload));
                let fr = FunctionResponse { id: "adk-conf-1".to_string(), name: CONFIRMATION_TOOL_NAME.to_string(), response };
                Event::new("inv", Author::User, Content { role: Some(flowengine_core::Role::User), parts: vec![Part::FunctionResponse(fr)] })
            },
        ];
        let resumed = resume_confirmations(&events).unwrap();
        assert_eq!(resumed.len(), 1);
        assert!(resumed[0].confirmation.confirmed);
    }
}
