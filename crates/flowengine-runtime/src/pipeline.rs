//! The Processor Pipeline (§2 layer 4, §4.1 steps 2 and 5a): ordered
//! request-processors that may yield events before the model is called, and
//! response-processors that purely mutate each response the model yields.

use async_trait::async_trait;
use flowengine_core::{Event, InvocationContext, LlmRequest, LlmResponse, Result};

/// Mutates the outgoing request and may emit events of its own (e.g. the
/// confirmation processor synthesizing a resumed function-response event).
/// A processor that yields an `Err` aborts the step (§4.1 step 2, §7
/// "Processor errors").
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, ctx: &InvocationContext, req: &mut LlmRequest) -> Result<Vec<Event>>;
}

/// A pure mutator over a single response (§4.1 step 5a).
#[async_trait]
pub trait ResponseProcessor: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, ctx: &InvocationContext, resp: &mut LlmResponse);
}

#[derive(Default)]
pub struct ProcessorPipeline {
    request_processors: Vec<Box<dyn RequestProcessor>>,
    response_processors: Vec<Box<dyn ResponseProcessor>>,
}

impl ProcessorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request_processor(mut self, processor: Box<dyn RequestProcessor>) -> Self {
        self.request_processors.push(processor);
        self
    }

    pub fn add_response_processor(mut self, processor: Box<dyn ResponseProcessor>) -> Self {
        self.response_processors.push(processor);
        self
    }

    /// Run every request-processor in order, collecting the events each one
    /// yields. A processor that fails aborts with a wrapped error naming it
    /// (§7 "Processor errors").
    pub async fn run_request_processors(&self, ctx: &InvocationContext, req: &mut LlmRequest) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for processor in &self.request_processors {
            let produced = processor.process(ctx, req).await.map_err(|e| flowengine_core::FlowError::processor(processor.name(), e))?;
            events.extend(produced);
        }
        Ok(events)
    }

    pub async fn run_response_processors(&self, ctx: &InvocationContext, resp: &mut LlmResponse) {
        for processor in &self.response_processors {
            processor.process(ctx, resp).await;
        }
    }
}
