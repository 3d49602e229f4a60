//! The model adapter contract (§6 "Model adapter contract").

use flowengine_core::{LlmRequest, LlmResponse};
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors an adapter may surface. These are distinct from `FlowError`
/// (§7's "Model errors" kind) — the flow engine wraps them when they cross
/// into the callback chain (§4.2).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context overflow: {0}")]
    ContextOverflow(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// A lazy sequence of `(LlmResponse, error)` pairs, as `Result` items.
pub type ModelStream = Pin<Box<dyn Stream<Item = ModelResult<LlmResponse>> + Send>>;

/// `GenerateContent(ctx, LLMRequest, stream: bool) -> lazy sequence of
/// (LLMResponse, error)` (§6).
#[async_trait::async_trait]
pub trait ModelAdapter: Send + Sync {
    /// The model identifier this adapter answers to.
    fn name(&self) -> &str;

    /// Distinguishes backend capabilities (e.g. whether this backend can
    /// natively enforce structured output alongside tool use, §4.9).
    fn backend_variant(&self) -> Option<&str> {
        None
    }

    fn supports_native_schema_with_tools(&self) -> bool {
        false
    }

    /// Generate a response. `stream = false` must yield exactly one
    /// element; `stream = true` may yield any number of partials ending
    /// with exactly one non-partial final. Must honor `cancel`.
    async fn generate_content(
        &self,
        request: LlmRequest,
        stream: bool,
        cancel: Option<CancellationToken>,
    ) -> ModelResult<ModelStream>;
}
