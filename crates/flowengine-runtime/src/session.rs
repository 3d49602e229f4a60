//! In-memory implementation of the `SessionStore` contract (§6), and a
//! registry that hands out one session per key the way the donor runtime's
//! `SessionRegistry` does — minus on-disk persistence, which is out of
//! scope here.

use dashmap::DashMap;
use flowengine_core::{Event, SessionStore, State};
use std::sync::{Arc, Mutex};

/// An append-only event log plus its layered state, shared by every
/// invocation running against the same session.
#[derive(Default)]
pub struct InMemorySession {
    events: Mutex<Vec<Event>>,
    state: Arc<Mutex<State>>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySession {
    async fn append(&self, event: Event) {
        {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            state.apply_committed_delta(&event.actions.state_delta);
        }
        self.events.lock().expect("session events mutex poisoned").push(event);
    }

    async fn events(&self) -> Vec<Event> {
        self.events.lock().expect("session events mutex poisoned").clone()
    }

    fn state(&self) -> Arc<Mutex<State>> {
        self.state.clone()
    }
}

/// Keyed pool of sessions, created lazily on first use (grounded on the
/// donor runtime's `SessionRegistry::get_or_create`).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<InMemorySession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, key: impl Into<String>) -> Arc<InMemorySession> {
        self.sessions.entry(key.into()).or_insert_with(|| Arc::new(InMemorySession::new())).clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<InMemorySession>> {
        self.sessions.get(key).map(|s| s.clone())
    }

    pub fn remove(&self, key: &str) -> Option<Arc<InMemorySession>> {
        self.sessions.remove(key).map(|(_, s)| s)
    }

    pub fn keys(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_core::{Author, Content, EventActions, Role};
    use serde_json::json;

    #[tokio::test]
    async fn append_commits_state_delta_to_backing_state() {
        let session = InMemorySession::new();
        let mut actions = EventActions::default();
        actions.state_delta.insert("city".to_string(), json!("london"));
        let event = Event::new("inv", Author::User, Content::text(Role::User, "hi")).with_actions(actions);
        session.append(event).await;

        let state = session.state();
        let guard = state.lock().unwrap();
        assert_eq!(guard.get("city"), Some(&json!("london")));
    }

    #[tokio::test]
    async fn events_are_returned_in_append_order() {
        let session = InMemorySession::new();
        session.append(Event::new("inv", Author::User, Content::text(Role::User, "one"))).await;
        session.append(Event::new("inv", Author::User, Content::text(Role::User, "two"))).await;
        let events = session.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content.parts[0].text_str(), Some("one"));
        assert_eq!(events[1].content.parts[0].text_str(), Some("two"));
    }

    #[test]
    fn registry_returns_the_same_session_for_the_same_key() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("alice");
        let b = registry.get_or_create("alice");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
