//! The content model (§3): `Content`, `Part`, `FunctionCall`/`FunctionResponse`,
//! and the `LLMRequest`/`LLMResponse` pair the model adapter boundary speaks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Synthesized function-call ids carry this prefix so they can be stripped
/// before being replayed to the model (§6 "Function-call ID prefix").
pub const SYNTHETIC_ID_PREFIX: &str = "adk-";

/// The reserved tool name for the confirmation sentinel (§4.6, §6).
pub const CONFIRMATION_TOOL_NAME: &str = "adk_request_confirmation";

/// The reserved tool name for structured-output enforcement (§4.9).
pub const SET_MODEL_RESPONSE_TOOL_NAME: &str = "set_model_response";

/// The reserved tool name for agent transfer (§4.7).
pub const TRANSFER_TOOL_NAME: &str = "transfer_to_agent";

/// Role of a `Content` block.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

/// One unit of content: a role plus an ordered list of parts.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role: Some(role), parts }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![Part::Text { text: text.into(), thought: false }])
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// True if every part is "structurally empty" — the §4.3 check for a
    /// trailing empty part some model backends emit mid-stream.
    pub fn is_structurally_empty(&self) -> bool {
        self.parts.iter().all(Part::is_structurally_empty)
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|p| match p {
            Part::FunctionCall(fc) => Some(fc),
            _ => None,
        })
    }

    pub fn function_responses(&self) -> impl Iterator<Item = &FunctionResponse> {
        self.parts.iter().filter_map(|p| match p {
            Part::FunctionResponse(fr) => Some(fr),
            _ => None,
        })
    }

    pub fn has_function_calls(&self) -> bool {
        self.function_calls().next().is_some()
    }
}

/// One of the six part kinds named in §3's `Content` invariant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String, #[serde(default)] thought: bool },
    #[serde(rename = "function_call")]
    FunctionCall(FunctionCall),
    #[serde(rename = "function_response")]
    FunctionResponse(FunctionResponse),
    #[serde(rename = "inline_data")]
    InlineData { mime_type: String, data: Vec<u8> },
    #[serde(rename = "file_data")]
    FileData { mime_type: String, file_uri: String },
}

impl Part {
    pub fn plain_text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into(), thought: false }
    }

    pub fn thought_text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into(), thought: true }
    }

    pub fn text_str(&self) -> Option<&str> {
        match self {
            Part::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, Part::Text { thought: true, .. })
    }

    pub fn is_audio_or_video(&self) -> bool {
        matches!(self, Part::InlineData { mime_type, .. } if mime_type.starts_with("audio/") || mime_type.starts_with("video/"))
    }

    fn is_structurally_empty(&self) -> bool {
        match self {
            Part::Text { text, .. } => text.is_empty(),
            Part::InlineData { data, .. } => data.is_empty(),
            Part::FileData { file_uri, .. } => file_uri.is_empty(),
            Part::FunctionCall(_) | Part::FunctionResponse(_) => false,
        }
    }
}

/// A call the model wants performed (§3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self { id: String::new(), name: name.into(), args }
    }
}

/// The result of executing a `FunctionCall` (§3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Map<String, Value>,
}

impl FunctionResponse {
    pub fn output(id: impl Into<String>, name: impl Into<String>, output: Value) -> Self {
        let mut response = Map::new();
        response.insert("output".to_string(), output);
        Self { id: id.into(), name: name.into(), response }
    }

    pub fn error(id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut response = Map::new();
        response.insert("error".to_string(), Value::String(message.into()));
        Self { id: id.into(), name: name.into(), response }
    }

    pub fn is_error(&self) -> bool {
        self.response.contains_key("error")
    }
}

/// Assign a fresh, prefixed id to every `FunctionCall` in `content` whose id
/// is empty. Idempotent: a second call is a no-op (testable property #1).
pub fn populate_client_function_call_id(content: &mut Content, next_id: &mut impl FnMut() -> String) {
    for part in &mut content.parts {
        if let Part::FunctionCall(fc) = part {
            if fc.id.is_empty() {
                fc.id = format!("{SYNTHETIC_ID_PREFIX}{}", next_id());
            }
        }
    }
}

/// Strip a synthesized id back to empty; ids that were not synthesized by us
/// (no prefix) are left untouched (testable property #2).
pub fn remove_client_function_call_id(id: &str) -> String {
    match id.strip_prefix(SYNTHETIC_ID_PREFIX) {
        Some(_) => String::new(),
        None => id.to_string(),
    }
}

/// A declared, callable capability's shape as sent to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Generation parameters and the tool/instruction surface of a request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerateContentConfig {
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub tool_declarations: Vec<ToolDeclaration>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// The outgoing request to a model adapter (§3, §6). Mutated only by
/// request processors and tool preprocessing, then frozen before the call.
///
/// `config.tool_declarations` and the dispatcher's tool registry are kept in
/// lockstep by construction (same key set, §3 invariant) — the request
/// itself only carries the wire-facing declarations, not tool handles.
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub config: GenerateContentConfig,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Default::default() }
    }

    /// Register a tool declaration, deduplicated by name (§3 invariant).
    pub fn add_tool_declaration(&mut self, decl: ToolDeclaration) {
        if let Some(existing) = self.config.tool_declarations.iter_mut().find(|d| d.name == decl.name) {
            *existing = decl;
        } else {
            self.config.tool_declarations.push(decl);
        }
    }
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    ToolCalls,
    Other,
}

/// Token accounting for one model call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One unit out of a model adapter's response stream (§3).
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: Option<Content>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<UsageMetadata>,
    /// A streaming fragment if true; at most one response per stream has
    /// `partial = false` (the "final" response).
    pub partial: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub interrupted: bool,
}

impl LlmResponse {
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }

    pub fn is_final(&self) -> bool {
        !self.partial && !self.interrupted && self.content.as_ref().map_or(true, |c| !c.is_empty()) && !self.is_error()
    }

    /// True once this response carries no function calls, isn't partial, and
    /// isn't an interrupt — the driver's step-6 termination test.
    pub fn is_final_response(&self) -> bool {
        !self.partial
            && !self.interrupted
            && self
                .content
                .as_ref()
                .map_or(true, |c| !c.has_function_calls())
    }
}
