//! Layered session state (§3 `State`, §6 "State key namespacing").
//!
//! Reads shadow a buffered per-invocation delta over backing session state;
//! writes land in both places so the delta can be committed onto the event
//! that's currently being built while later reads in the same invocation
//! see their own uncommitted writes.

use serde_json::{Map, Value};

pub const APP_PREFIX: &str = "app:";
pub const USER_PREFIX: &str = "user:";
pub const TEMP_PREFIX: &str = "temp:";

/// A valid state key is `[A-Za-z_][A-Za-z0-9_]*`, optionally prefixed by
/// exactly one of `app:`, `user:`, `temp:` (§6).
pub fn is_valid_state_key(key: &str) -> bool {
    let unprefixed = key
        .strip_prefix(APP_PREFIX)
        .or_else(|| key.strip_prefix(USER_PREFIX))
        .or_else(|| key.strip_prefix(TEMP_PREFIX))
        .unwrap_or(key);
    let mut chars = unprefixed.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Backing session state plus the current invocation's pending delta.
#[derive(Clone, Debug, Default)]
pub struct State {
    backing: Map<String, Value>,
    pending_delta: Map<String, Value>,
}

impl State {
    pub fn new(backing: Map<String, Value>) -> Self {
        Self { backing, pending_delta: Map::new() }
    }

    /// A read shadows the backing value with any uncommitted delta (§3).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pending_delta.get(key).or_else(|| self.backing.get(key))
    }

    /// A write is buffered into the current delta AND applied to the
    /// backing map immediately, matching the §3 invariant: "a write is
    /// buffered in the current event's state-delta AND applied to backing
    /// state".
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.pending_delta.insert(key.clone(), value.clone());
        self.backing.insert(key, value);
    }

    /// The delta accumulated since the last `take_delta`, to be attached to
    /// the event currently being built.
    pub fn take_delta(&mut self) -> Map<String, Value> {
        std::mem::take(&mut self.pending_delta)
    }

    pub fn backing(&self) -> &Map<String, Value> {
        &self.backing
    }

    /// Apply a committed `EventActions.state_delta` onto backing state, as
    /// the session store does when an event is appended.
    pub fn apply_committed_delta(&mut self, delta: &Map<String, Value>) {
        for (k, v) in delta {
            self.backing.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys() {
        assert!(is_valid_state_key("foo"));
        assert!(is_valid_state_key("_foo_1"));
        assert!(is_valid_state_key("app:foo"));
        assert!(is_valid_state_key("user:foo_bar"));
        assert!(is_valid_state_key("temp:x"));
    }

    #[test]
    fn invalid_keys() {
        assert!(!is_valid_state_key(""));
        assert!(!is_valid_state_key("1foo"));
        assert!(!is_valid_state_key("foo-bar"));
        assert!(!is_valid_state_key("other:foo"));
    }

    #[test]
    fn read_shadows_pending_over_backing() {
        let mut backing = Map::new();
        backing.insert("k".to_string(), Value::from(1));
        let mut state = State::new(backing);
        assert_eq!(state.get("k"), Some(&Value::from(1)));
        state.set("k", Value::from(2));
        assert_eq!(state.get("k"), Some(&Value::from(2)));
        assert_eq!(state.backing().get("k"), Some(&Value::from(2)));
    }

    #[test]
    fn take_delta_drains_and_resets() {
        let mut state = State::default();
        state.set("a", Value::from(1));
        state.set("b", Value::from(2));
        let delta = state.take_delta();
        assert_eq!(delta.len(), 2);
        assert!(state.take_delta().is_empty());
    }
}
