//! Instruction Template Substitution (§4.8).
//!
//! Placeholders take the form `{name}` / `{name?}` for state keys, or
//! `{artifact.filename}` / `{artifact.filename?}` for artifacts. A literal
//! `{{...}}` passes through unchanged, since the scanner only strips one
//! layer of braces and the inner `{...}` is left for a caller who wants
//! double-brace escaping.

use flowengine_core::{ArtifactStore, FlowError, Result, State};
use std::sync::{Arc, Mutex};

/// One substitution found by the scanner.
struct Placeholder<'a> {
    /// Byte range in the source string, braces included.
    span: (usize, usize),
    /// The `{...}` interior, braces and optional trailing `?` stripped.
    key: &'a str,
    optional: bool,
}

/// Matches the `{+[^{}]*}+` scanner pattern: a run of one-or-more `{`, then
/// non-brace characters, then a run of one-or-more `}`. A run of exactly one
/// brace on each side is a placeholder; any longer run (e.g. `{{...}}`) is a
/// literal escape left untouched, since the outer layer never gets stripped.
fn scan(instruction: &str) -> Vec<Placeholder<'_>> {
    let mut out = Vec::new();
    let bytes = instruction.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let open_start = i;
        let mut open_end = i;
        while open_end < bytes.len() && bytes[open_end] == b'{' {
            open_end += 1;
        }
        let body_start = open_end;
        let mut body_end = body_start;
        while body_end < bytes.len() && bytes[body_end] != b'{' && bytes[body_end] != b'}' {
            body_end += 1;
        }
        if body_end >= bytes.len() || bytes[body_end] != b'}' {
            i = body_end.max(open_end + 1);
            continue;
        }
        let close_start = body_end;
        let mut close_end = close_start;
        while close_end < bytes.len() && bytes[close_end] == b'}' {
            close_end += 1;
        }

        let open_len = open_end - open_start;
        let close_len = close_end - close_start;
        if open_len == 1 && close_len == 1 && body_end > body_start {
            let inner = &instruction[body_start..body_end];
            let (key, optional) = match inner.strip_suffix('?') {
                Some(k) => (k, true),
                None => (inner, false),
            };
            out.push(Placeholder { span: (open_start, close_end), key, optional });
        }
        i = close_end;
    }
    out
}

/// Substitute every placeholder in `instruction` in left-to-right order
/// (testable property #7). `state` resolves `{name}`/`{name?}`; `artifacts`
/// (if present) resolves `{artifact.filename}`/`{artifact.filename?}`.
pub async fn substitute_instruction(instruction: &str, state: &Arc<Mutex<State>>, artifacts: Option<&Arc<dyn ArtifactStore>>) -> Result<String> {
    let placeholders = scan(instruction);
    if placeholders.is_empty() {
        return Ok(instruction.to_string());
    }

    let mut out = String::with_capacity(instruction.len());
    let mut cursor = 0;
    for placeholder in placeholders {
        out.push_str(&instruction[cursor..placeholder.span.0]);
        let resolved = resolve(placeholder.key, placeholder.optional, state, artifacts).await?;
        out.push_str(&resolved);
        cursor = placeholder.span.1;
    }
    out.push_str(&instruction[cursor..]);
    Ok(out)
}

async fn resolve(key: &str, optional: bool, state: &Arc<Mutex<State>>, artifacts: Option<&Arc<dyn ArtifactStore>>) -> Result<String> {
    if let Some(filename) = key.strip_prefix("artifact.") {
        return resolve_artifact(filename, optional, artifacts).await;
    }
    resolve_state_key(key, optional, state)
}

fn resolve_state_key(key: &str, optional: bool, state: &Arc<Mutex<State>>) -> Result<String> {
    let guard = state.lock().expect("state mutex poisoned");
    match guard.get(key) {
        Some(value) => Ok(value_to_text(value)),
        None if optional => Ok(String::new()),
        None => Err(FlowError::UnresolvedStateKey(key.to_string())),
    }
}

async fn resolve_artifact(filename: &str, optional: bool, artifacts: Option<&Arc<dyn ArtifactStore>>) -> Result<String> {
    let Some(store) = artifacts else {
        return if optional { Ok(String::new()) } else { Err(FlowError::MissingArtifact(filename.to_string())) };
    };
    match store.load(filename).await {
        Some(value) => Ok(value_to_text(&value)),
        None if optional => Ok(String::new()),
        None => Err(FlowError::MissingArtifact(filename.to_string())),
    }
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_core::FlowError;
    use serde_json::{json, Map};

    fn state_with(pairs: &[(&str, serde_json::Value)]) -> Arc<Mutex<State>> {
        let mut map = Map::new();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        Arc::new(Mutex::new(State::new(map)))
    }

    #[tokio::test]
    async fn substitutes_plain_and_prefixed_keys_left_to_right() {
        let state = state_with(&[("user:name", json!("Ada")), ("topic", json!("compilers"))]);
        let out = substitute_instruction("Hello {user:name}, let's talk about {topic}.", &state, None).await.unwrap();
        assert_eq!(out, "Hello Ada, let's talk about compilers.");
    }

    #[tokio::test]
    async fn optional_missing_key_yields_empty_string() {
        let state = state_with(&[]);
        let out = substitute_instruction("Note: {user:nickname?}", &state, None).await.unwrap();
        assert_eq!(out, "Note: ");
    }

    #[tokio::test]
    async fn required_missing_key_fails_with_state_error() {
        let state = state_with(&[]);
        let err = substitute_instruction("Required: {missing}", &state, None).await.unwrap_err();
        assert!(matches!(err, FlowError::UnresolvedStateKey(k) if k == "missing"));
    }

    #[tokio::test]
    async fn double_brace_literal_passes_through_unchanged() {
        let state = state_with(&[]);
        let out = substitute_instruction("Use {{literal}} braces", &state, None).await.unwrap();
        assert_eq!(out, "Use {{literal}} braces");
    }

    #[tokio::test]
    async fn missing_artifact_without_store_and_without_optional_is_an_error() {
        let state = state_with(&[]);
        let err = substitute_instruction("{artifact.readme.md}", &state, None).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingArtifact(name) if name == "readme.md"));
    }

    #[tokio::test]
    async fn missing_artifact_optional_without_store_yields_empty() {
        let state = state_with(&[]);
        let out = substitute_instruction("{artifact.readme.md?}", &state, None).await.unwrap();
        assert_eq!(out, "");
    }
}
