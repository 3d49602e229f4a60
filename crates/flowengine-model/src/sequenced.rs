//! An in-memory model adapter that replays a fixed sequence of responses.
//!
//! Exists to exercise the flow engine end-to-end in tests and the example
//! binary without a network dependency; it is not a production model
//! integration (concrete provider adapters remain a Non-goal).

use crate::provider::{ModelAdapter, ModelResult, ModelStream};
use async_stream::stream;
use flowengine_core::LlmResponse;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Replays a pre-scripted list of responses for each call to
/// `generate_content`, one list per call, consumed in order. Useful for
/// scripting multi-turn scenarios (e.g. S2's tool-call-then-answer).
pub struct SequencedModel {
    name: String,
    turns: Mutex<std::collections::VecDeque<Vec<LlmResponse>>>,
}

impl SequencedModel {
    pub fn new(name: impl Into<String>, turns: Vec<Vec<LlmResponse>>) -> Self {
        Self { name: name.into(), turns: Mutex::new(turns.into()) }
    }
}

#[async_trait::async_trait]
impl ModelAdapter for SequencedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_content(
        &self,
        _request: flowengine_core::LlmRequest,
        _stream: bool,
        cancel: Option<CancellationToken>,
    ) -> ModelResult<ModelStream> {
        let responses = self
            .turns
            .lock()
            .expect("sequenced model mutex poisoned")
            .pop_front()
            .unwrap_or_default();

        let s = stream! {
            for response in responses {
                if let Some(c) = &cancel {
                    if c.is_cancelled() {
                        break;
                    }
                }
                yield Ok(response);
            }
        };
        Ok(Box::pin(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_core::{Content, Role};

    #[tokio::test]
    async fn replays_one_turn_per_call() {
        let model = SequencedModel::new(
            "demo",
            vec![vec![LlmResponse { content: Some(Content::text(Role::Model, "4")), ..Default::default() }]],
        );
        let mut stream = model.generate_content(flowengine_core::LlmRequest::new("demo"), false, None).await.unwrap();
        use futures::StreamExt;
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.content.unwrap().parts[0].text_str(), Some("4"));
        assert!(stream.next().await.is_none());
    }
}
