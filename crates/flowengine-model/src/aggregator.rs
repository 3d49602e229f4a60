//! Streaming Response Aggregator (§4.3).
//!
//! Folds a sequence of partial `LlmResponse` fragments into the original
//! partial stream, passed through, plus one aggregated final response
//! emitted when the stream's text run ends.

use flowengine_core::{Content, LlmResponse, Part, Role};

#[derive(Default)]
pub struct Aggregator {
    text: String,
    thought_text: String,
    role: Option<Role>,
    buffering: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next response from the adapter. Returns the responses to
    /// emit, in order: usually `[response]` unchanged, sometimes
    /// `[aggregate, response]` when a buffered text run just ended.
    pub fn push(&mut self, response: LlmResponse) -> Vec<LlmResponse> {
        let Some(content) = response.content.clone() else {
            return self.flush_then(response);
        };

        let Some(first) = content.parts.first() else {
            return self.flush_then(response);
        };

        if let Part::Text { text, thought } = first {
            if !text.is_empty() {
                self.role = content.role;
                if *thought {
                    self.thought_text.push_str(text);
                } else {
                    self.text.push_str(text);
                }
                self.buffering = true;
                let mut partial = response;
                partial.partial = true;
                return vec![partial];
            }
        }

        if content.is_structurally_empty() {
            let mut partial = response;
            partial.partial = true;
            return vec![partial];
        }

        let has_audio = content.parts.iter().any(Part::is_audio_or_video);
        if has_audio {
            return vec![response];
        }

        self.flush_then(response)
    }

    /// Call when the adapter's stream has closed, to flush any trailing
    /// buffered text.
    pub fn close(&mut self) -> Option<LlmResponse> {
        self.take_aggregate()
    }

    fn flush_then(&mut self, response: LlmResponse) -> Vec<LlmResponse> {
        match self.take_aggregate() {
            Some(agg) => vec![agg, response],
            None => vec![response],
        }
    }

    fn take_aggregate(&mut self) -> Option<LlmResponse> {
        if !self.buffering {
            return None;
        }
        self.buffering = false;
        let mut parts = Vec::new();
        if !self.thought_text.is_empty() {
            parts.push(Part::thought_text(std::mem::take(&mut self.thought_text)));
        }
        if !self.text.is_empty() {
            parts.push(Part::plain_text(std::mem::take(&mut self.text)));
        }
        if parts.is_empty() {
            return None;
        }
        Some(LlmResponse {
            content: Some(Content { role: self.role, parts }),
            finish_reason: None,
            usage: None,
            partial: false,
            error_code: None,
            error_message: None,
            interrupted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_core::FunctionCall;

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            content: Some(Content::text(Role::Model, text)),
            partial: true,
            ..Default::default()
        }
    }

    #[test]
    fn aggregate_equals_concatenation_of_partials() {
        let mut agg = Aggregator::new();
        let mut out = Vec::new();
        for chunk in ["Par", "is", "\n"] {
            out.extend(agg.push(text_response(chunk)));
        }
        let final_response = agg.close().unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.partial));
        let text = final_response.content.unwrap().parts[0].text_str().unwrap().to_string();
        assert_eq!(text, "Paris\n");
        assert!(!final_response.partial);
    }

    #[test]
    fn thought_and_text_tracked_separately() {
        let mut agg = Aggregator::new();
        agg.push(LlmResponse { content: Some(Content::new(Role::Model, vec![Part::thought_text("thinking...")])), partial: true, ..Default::default() });
        agg.push(text_response("answer"));
        let agg_response = agg.close().unwrap();
        let parts = agg_response.content.unwrap().parts;
        assert_eq!(parts.len(), 2);
        assert!(parts[0].is_thought());
        assert!(!parts[1].is_thought());
    }

    #[test]
    fn function_call_flushes_buffered_text_before_passthrough() {
        let mut agg = Aggregator::new();
        agg.push(text_response("thinking aloud"));
        let fc_response = LlmResponse {
            content: Some(Content::new(Role::Model, vec![Part::FunctionCall(FunctionCall::new("f", Default::default()))])),
            ..Default::default()
        };
        let out = agg.push(fc_response);
        assert_eq!(out.len(), 2);
        assert!(!out[0].partial);
        assert!(out[1].content.as_ref().unwrap().has_function_calls());
    }

    #[test]
    fn audio_only_stream_passes_through_unaggregated() {
        let mut agg = Aggregator::new();
        let audio = LlmResponse {
            content: Some(Content::new(Role::Model, vec![Part::InlineData { mime_type: "audio/wav".into(), data: vec![1, 2, 3] }])),
            ..Default::default()
        };
        let out = agg.push(audio);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn structurally_empty_part_is_buffered_as_partial_without_emitting() {
        let mut agg = Aggregator::new();
        let empty = LlmResponse {
            content: Some(Content::new(Role::Model, vec![Part::plain_text("")])),
            ..Default::default()
        };
        let out = agg.push(empty);
        assert_eq!(out.len(), 1);
        assert!(out[0].partial);
        assert!(agg.close().is_none());
    }
}
