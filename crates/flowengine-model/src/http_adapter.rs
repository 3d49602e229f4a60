//! A generic HTTP+SSE model adapter.
//!
//! Speaks a small JSON-over-SSE protocol of its own (not any particular
//! vendor's wire format — that integration work is explicitly out of scope,
//! §1 Non-goals) against a configurable endpoint, so the crate still shows
//! the reqwest/async-stream idiom real adapters are built with.

use crate::provider::{ModelAdapter, ModelError, ModelResult, ModelStream};
use async_stream::stream;
use flowengine_core::{Content, LlmRequest, LlmResponse};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct HttpModelAdapter {
    name: String,
    endpoint: String,
    client: Client,
    api_key: Option<String>,
}

impl HttpModelAdapter {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self { name: name.into(), endpoint: endpoint.into(), client: Client::new(), api_key: None }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    contents: &'a [Content],
    stream: bool,
}

#[derive(Deserialize)]
#[serde(tag = "event", content = "data")]
enum WireEvent {
    #[serde(rename = "delta")]
    Delta { text: String },
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "error")]
    Error { message: String },
}

#[async_trait::async_trait]
impl ModelAdapter for HttpModelAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_content(
        &self,
        request: LlmRequest,
        stream: bool,
        cancel: Option<CancellationToken>,
    ) -> ModelResult<ModelStream> {
        let body = WireRequest { model: &request.model, contents: &request.contents, stream };
        debug!(model = %request.model, "dispatching model request");

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => ModelError::AuthFailed(text),
                429 => ModelError::RateLimited { retry_after_ms: 60_000 },
                _ => ModelError::RequestFailed(format!("{status}: {text}")),
            });
        }

        let byte_stream = response.bytes_stream();
        let out = parse_sse(byte_stream, cancel);
        Ok(Box::pin(out))
    }
}

fn parse_sse(
    byte_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    cancel: Option<CancellationToken>,
) -> impl futures::Stream<Item = ModelResult<LlmResponse>> + Send {
    stream! {
        let mut buffer = String::new();
        tokio::pin!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            if let Some(c) = &cancel {
                if c.is_cancelled() {
                    yield Err(ModelError::Cancelled);
                    return;
                }
            }
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => { yield Err(ModelError::StreamError(e.to_string())); return; }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(idx) = buffer.find("\n\n") {
                let raw = buffer[..idx].to_string();
                buffer = buffer[idx + 2..].to_string();

                let mut event = String::new();
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(rest) = line.strip_prefix("event: ") {
                        event = rest.to_string();
                    } else if let Some(rest) = line.strip_prefix("data: ") {
                        data = rest.to_string();
                    }
                }
                if data.is_empty() { continue; }

                let wrapped = serde_json::json!({"event": event, "data": serde_json::from_str::<serde_json::Value>(&data).unwrap_or_default()});
                match serde_json::from_value::<WireEvent>(wrapped) {
                    Ok(WireEvent::Delta { text }) => {
                        yield Ok(LlmResponse { content: Some(Content::text(flowengine_core::Role::Model, text)), partial: true, ..Default::default() });
                    }
                    Ok(WireEvent::Done) => {
                        yield Ok(LlmResponse { partial: false, ..Default::default() });
                    }
                    Ok(WireEvent::Error { message }) => {
                        yield Err(ModelError::StreamError(message));
                    }
                    Err(e) => {
                        warn!(error = %e, "unrecognized SSE event, skipping");
                    }
                }
            }
        }
    }
}
