//! Session events and their side-effect record, `EventActions` (§3, §4.5).

use crate::content::Content;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Who authored an `Event`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Author {
    User,
    Agent(String),
    System,
}

impl Author {
    pub fn as_str(&self) -> &str {
        match self {
            Author::User => "user",
            Author::Agent(name) => name.as_str(),
            Author::System => "system",
        }
    }
}

/// A tool's request for the user to approve or deny an action (§3).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolConfirmation {
    pub hint: String,
    pub confirmed: bool,
    #[serde(default)]
    pub payload: Value,
}

impl ToolConfirmation {
    pub fn unconfirmed(hint: impl Into<String>, payload: Value) -> Self {
        Self { hint: hint.into(), confirmed: false, payload }
    }
}

/// One entry of an artifact delta: the bytes/part saved plus the version the
/// writer observed, so last-write-wins can at least record what was seen
/// (§4.5, §9 open question).
#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactDeltaEntry {
    pub version: u64,
}

/// The side-effect record attached to an `Event` (§3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventActions {
    pub state_delta: Map<String, Value>,
    pub artifact_delta: HashMap<String, ArtifactDeltaEntry>,
    pub transfer_to_agent: Option<String>,
    pub skip_summarization: bool,
    pub escalate: bool,
    pub requested_tool_confirmations: HashMap<String, ToolConfirmation>,
}

impl EventActions {
    pub fn is_empty(&self) -> bool {
        self.state_delta.is_empty()
            && self.artifact_delta.is_empty()
            && self.transfer_to_agent.is_none()
            && !self.skip_summarization
            && !self.escalate
            && self.requested_tool_confirmations.is_empty()
    }
}

/// Deep-merge `other` into `base` in place: for keys present on both sides
/// where both values are objects, recurse; otherwise `other` wins (§4.5).
fn deep_merge_state(base: &mut Map<String, Value>, other: &Map<String, Value>) {
    for (key, other_val) in other {
        match base.get_mut(key) {
            Some(Value::Object(base_map)) => {
                if let Value::Object(other_map) = other_val {
                    deep_merge_state(base_map, other_map);
                    continue;
                }
                base.insert(key.clone(), other_val.clone());
            }
            _ => {
                base.insert(key.clone(), other_val.clone());
            }
        }
    }
}

/// Merge two `EventActions`, either of which may be absent (§4.5). This is
/// the single merge rule used both for parallel-tool reduction (§4.4) and
/// for any other point two action sets need combining.
pub fn merge_event_actions(base: Option<EventActions>, other: Option<EventActions>) -> Option<EventActions> {
    match (base, other) {
        (None, x) => x,
        (x, None) => x,
        (Some(mut base), Some(other)) => {
            base.skip_summarization = base.skip_summarization || other.skip_summarization;
            base.escalate = base.escalate || other.escalate;
            if other.transfer_to_agent.is_some() {
                base.transfer_to_agent = other.transfer_to_agent;
            }
            deep_merge_state(&mut base.state_delta, &other.state_delta);
            for (k, v) in other.requested_tool_confirmations {
                base.requested_tool_confirmations.insert(k, v);
            }
            for (k, v) in other.artifact_delta {
                base.artifact_delta.insert(k, v);
            }
            Some(base)
        }
    }
}

/// Fold a left-to-right ordered sequence of per-tool `EventActions` into one
/// (testable property #4: the fold is associative left-to-right).
pub fn merge_all_event_actions(actions: impl IntoIterator<Item = EventActions>) -> EventActions {
    actions
        .into_iter()
        .fold(None, |acc, next| merge_event_actions(acc, Some(next)))
        .unwrap_or_default()
}

/// An append-only log entry (§3).
#[derive(Clone, Debug)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: Author,
    pub branch: Option<String>,
    pub content: Content,
    pub actions: EventActions,
    pub long_running_tool_ids: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: Author, content: Content) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author,
            branch: None,
            content,
            actions: EventActions::default(),
            long_running_tool_ids: Vec::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_long_running_tool_ids(mut self, ids: Vec<String>) -> Self {
        self.long_running_tool_ids = ids;
        self
    }

    /// An event is a final response if it carries no function calls, is not
    /// a streaming partial, and is not an interrupt (§4.1 step 6). Events
    /// don't carry partial/interrupted flags directly — those live on the
    /// `LlmResponse` that produced them — so the flow driver tracks that
    /// separately and calls this only for structural shape.
    pub fn has_function_calls(&self) -> bool {
        self.content.has_function_calls()
    }

    pub fn has_function_responses(&self) -> bool {
        self.content.function_responses().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actions_with_state(pairs: &[(&str, Value)]) -> EventActions {
        let mut a = EventActions::default();
        for (k, v) in pairs {
            a.state_delta.insert((*k).to_string(), v.clone());
        }
        a
    }

    #[test]
    fn merge_state_delta_deep_merges_nested_objects() {
        let base = actions_with_state(&[("ns", json!({"a": 1, "b": 1}))]);
        let other = actions_with_state(&[("ns", json!({"b": 2, "c": 3}))]);
        let merged = merge_event_actions(Some(base), Some(other)).unwrap();
        assert_eq!(merged.state_delta.get("ns").unwrap(), &json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn merge_booleans_are_or() {
        let mut base = EventActions::default();
        base.skip_summarization = true;
        let other = EventActions::default();
        let merged = merge_event_actions(Some(base), Some(other)).unwrap();
        assert!(merged.skip_summarization);
    }

    #[test]
    fn merge_transfer_to_agent_last_wins_if_present() {
        let mut base = EventActions::default();
        base.transfer_to_agent = Some("a".to_string());
        let mut other = EventActions::default();
        other.transfer_to_agent = None;
        let merged = merge_event_actions(Some(base.clone()), Some(other)).unwrap();
        assert_eq!(merged.transfer_to_agent, Some("a".to_string()));

        let mut other2 = EventActions::default();
        other2.transfer_to_agent = Some("b".to_string());
        let merged2 = merge_event_actions(Some(base), Some(other2)).unwrap();
        assert_eq!(merged2.transfer_to_agent, Some("b".to_string()));
    }

    #[test]
    fn merge_none_identities() {
        let mut a = EventActions::default();
        a.escalate = true;
        assert_eq!(merge_event_actions(None, Some(a.clone())), Some(a.clone()));
        assert_eq!(merge_event_actions(Some(a.clone()), None), Some(a));
        assert_eq!(merge_event_actions(None, None), None);
    }

    #[test]
    fn merge_is_left_to_right_associative() {
        let a = actions_with_state(&[("k", json!(1))]);
        let b = actions_with_state(&[("k", json!(2))]);
        let c = actions_with_state(&[("k", json!(3))]);

        let left_first = merge_event_actions(merge_event_actions(Some(a.clone()), Some(b.clone())), Some(c.clone()));
        let folded = merge_all_event_actions(vec![a, b, c]);
        assert_eq!(left_first.unwrap().state_delta, folded.state_delta);
    }
}
