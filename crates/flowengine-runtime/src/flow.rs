//! The Flow Driver (§2 layer 8, §4.1): the top-level loop that alternates
//! model calls and tool dispatches for one invocation, plus `call_llm`
//! (§4.2) and the confirmation-resume request-processor (§4.6) that kicks
//! it off.

use crate::pipeline::{ProcessorPipeline, RequestProcessor};
use async_stream::stream;
use async_trait::async_trait;
use flowengine_core::{
    populate_client_function_call_id, Agent, Author, Content, Event, FlowError, FunctionCall, InvocationContext, LlmRequest, LlmResponse, Part, Result, Role,
    ToolConfirmation, CONFIRMATION_TOOL_NAME, SET_MODEL_RESPONSE_TOOL_NAME, SYNTHETIC_ID_PREFIX,
};
use flowengine_model::{Aggregator, ModelAdapter};
use flowengine_tools::{dispatch_function_calls, resume_confirmations, SetModelResponseTool, Tool, ToolRegistry, TransferToAgentTool};
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::Instrument;

/// Model adapters keyed by the name an `Agent.model` field names.
#[derive(Default)]
pub struct ModelRegistry {
    adapters: HashMap<String, Arc<dyn ModelAdapter>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ModelAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelAdapter>> {
        self.adapters.get(name).cloned()
    }
}

/// The resume algorithm of §4.6, modeled as the request-processor that runs
/// first every step (it is a no-op once the outstanding confirmations in
/// the log have already been resolved).
struct ConfirmationResumeProcessor {
    tools: ToolRegistry,
}

#[async_trait]
impl RequestProcessor for ConfirmationResumeProcessor {
    fn name(&self) -> &str {
        "confirmation-resume"
    }

    async fn process(&self, ctx: &InvocationContext, _req: &mut LlmRequest) -> Result<Vec<Event>> {
        let events = ctx.session.events().await;
        let resumed = resume_confirmations(&events)?;
        if resumed.is_empty() {
            return Ok(vec![]);
        }

        let mut confirmations = HashMap::new();
        let mut calls = Vec::with_capacity(resumed.len());
        for r in resumed {
            confirmations.insert(r.original_call.id.clone(), r.confirmation);
            calls.push(r.original_call);
        }

        let event = dispatch_function_calls(ctx, &self.tools, &calls, &confirmations).await;
        Ok(event.into_iter().collect())
    }
}

enum StepOutcome {
    Continue,
    Done,
    Transfer(Arc<Agent>),
}

pub struct FlowDriver {
    parents: flowengine_core::ParentMap,
    tools: ToolRegistry,
    models: ModelRegistry,
    pipeline: ProcessorPipeline,
}

impl FlowDriver {
    pub fn new(root: Arc<Agent>, tools: ToolRegistry, models: ModelRegistry) -> Self {
        let parents = flowengine_core::ParentMap::build(&root);
        let pipeline = ProcessorPipeline::new().add_request_processor(Box::new(ConfirmationResumeProcessor { tools: tools.clone() }));
        Self { parents, tools, models, pipeline }
    }

    /// Append extra request/response processors after the mandatory
    /// confirmation-resume stage.
    pub fn with_request_processor(mut self, processor: Box<dyn RequestProcessor>) -> Self {
        self.pipeline = self.pipeline.add_request_processor(processor);
        self
    }

    pub fn with_response_processor(mut self, processor: Box<dyn crate::pipeline::ResponseProcessor>) -> Self {
        self.pipeline = self.pipeline.add_response_processor(processor);
        self
    }

    /// Run one invocation to completion, yielding every `Event` it produces
    /// in causal order (§5 "Ordering guarantees") — a model chunk or a tool
    /// dispatch is yielded to the caller as soon as it is produced, not
    /// after the whole step finishes. Boxed because an agent transfer
    /// recurses into a fresh run of the target agent's flow.
    pub fn run<'a>(&'a self, invocation: InvocationContext) -> Pin<Box<dyn Stream<Item = Result<Event>> + Send + 'a>> {
        Box::pin(stream! {
            let mut invocation = invocation;
            loop {
                let outcome_slot: Mutex<Option<StepOutcome>> = Mutex::new(None);
                let mut failed = false;
                {
                    let mut step = self.run_step(&invocation, &outcome_slot);
                    while let Some(item) = step.next().await {
                        match item {
                            Ok(event) => yield Ok(event),
                            Err(e) => {
                                yield Err(e);
                                failed = true;
                                break;
                            }
                        }
                    }
                }
                if failed {
                    return;
                }

                let outcome = outcome_slot.into_inner().expect("outcome mutex poisoned").unwrap_or(StepOutcome::Done);
                match outcome {
                    StepOutcome::Done => return,
                    StepOutcome::Continue => continue,
                    StepOutcome::Transfer(target) => {
                        invocation = invocation.with_agent(target);
                        let mut child = self.run(invocation);
                        while let Some(item) = child.next().await {
                            yield item;
                        }
                        return;
                    }
                }
            }
        })
    }

    /// Run one preprocess/call-model/postprocess/dispatch-tools cycle,
    /// yielding each event as it is produced and recording how the step
    /// ended into `outcome_slot` once the stream is exhausted.
    fn run_step<'b>(&'b self, invocation: &'b InvocationContext, outcome_slot: &'b Mutex<Option<StepOutcome>>) -> Pin<Box<dyn Stream<Item = Result<Event>> + Send + 'b>> {
        Box::pin(stream! {
            let agent = invocation.agent.clone();
            let model_name = match agent.model.clone() {
                Some(m) => m,
                None => {
                    yield Err(FlowError::ModelNotConfigured { agent: agent.name.clone() });
                    return;
                }
            };

            let mut request = LlmRequest::new(model_name.clone());
            request.contents = build_contents(&invocation.session.events().await);

            let state = invocation.session.state();
            let substituted = match crate::instruction::substitute_instruction(&agent.instruction, &state, invocation.artifacts.as_ref()).await {
                Ok(s) => s,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            if !substituted.is_empty() {
                request.config.system_instruction = Some(substituted);
            }

            let request_events = match self.pipeline.run_request_processors(invocation, &mut request).await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for event in request_events {
                invocation.session.append(event.clone()).await;
                yield Ok(event);
            }

            if invocation.is_ended() {
                *outcome_slot.lock().expect("outcome mutex poisoned") = Some(StepOutcome::Done);
                return;
            }

            let mut step_registry = ToolRegistry::new();
            for decl in &agent.tools {
                request.add_tool_declaration(decl.clone());
                if let Some(tool) = self.tools.get(&decl.name) {
                    let _ = step_registry.register(tool);
                }
            }

            if agent.is_auto_flow() {
                let transfer_tool = Arc::new(TransferToAgentTool::for_agent(&agent, &self.parents));
                if !transfer_tool.targets().is_empty() {
                    request.add_tool_declaration(transfer_tool.to_declaration());
                    step_registry = step_registry.with_additional(transfer_tool);
                }
            }

            let adapter = match self.models.get(&model_name) {
                Some(a) => a,
                None => {
                    yield Err(FlowError::ModelNotConfigured { agent: agent.name.clone() });
                    return;
                }
            };

            if let Some(schema) = &agent.output_schema {
                if !agent.tools.is_empty() && !adapter.supports_native_schema_with_tools() {
                    let smr = Arc::new(SetModelResponseTool::new(schema.clone()));
                    request.add_tool_declaration(smr.to_declaration());
                    step_registry = step_registry.with_additional(smr);
                    let note = "When you have your final answer, call `set_model_response` with it.";
                    request.config.system_instruction = Some(match request.config.system_instruction.take() {
                        Some(existing) if !existing.is_empty() => format!("{existing}\n\n{note}"),
                        _ => note.to_string(),
                    });
                }
            }

            let llm_stream = match call_llm(invocation, adapter.as_ref(), request).await {
                Ok(s) => s,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut llm_stream = llm_stream.peekable();

            // Whether the step is done once the model stream drains. A plain
            // text final response is terminal on its own; a tool dispatch flips
            // it back to "keep going" so the model can see the tool's output,
            // except when the dispatch itself is a stopping point (the HITL
            // confirmation pause sets `skip_summarization`, and a successful
            // `set_model_response` call synthesizes the final answer itself).
            let mut terminal = false;

            // §4.2 folds a response through the `Aggregator` only once the
            // adapter has actually produced more than one response in the
            // stream — a length-one (non-streaming) call is emitted as-is,
            // no partial/aggregate split. `aggregator` starts `None` and is
            // created lazily the first time a second response is observed.
            let mut aggregator: Option<Aggregator> = None;

            loop {
                let response = match llm_stream.next().await {
                    Some(Ok(r)) => r,
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => break,
                };

                let has_more = Pin::new(&mut llm_stream).peek().await.is_some();

                let to_process: Vec<LlmResponse> = if aggregator.is_some() || has_more {
                    let agg = aggregator.get_or_insert_with(Aggregator::new);
                    let mut out = agg.push(response);
                    if !has_more {
                        if let Some(final_agg) = agg.close() {
                            out.push(final_agg);
                        } else if out.last().map_or(false, |r| r.partial) {
                            yield Err(FlowError::UnterminatedStream);
                            return;
                        }
                    }
                    out
                } else {
                    vec![response]
                };

                for mut response in to_process {
                    self.pipeline.run_response_processors(invocation, &mut response).await;

                    let is_empty_ok = response.content.as_ref().map_or(true, |c| c.is_structurally_empty());
                    if is_empty_ok && !response.is_error() && !response.interrupted {
                        continue;
                    }

                    let mut content = response.content.clone().unwrap_or_default();
                    let mut counter: u64 = 0;
                    populate_client_function_call_id(&mut content, &mut move || {
                        counter += 1;
                        counter.to_string()
                    });

                    let long_running: Vec<String> = content
                        .function_calls()
                        .filter(|fc| step_registry.get(&fc.name).map_or(false, |t| t.is_long_running()))
                        .map(|fc| fc.id.clone())
                        .collect();

                    let model_event = Event::new(invocation.invocation_id.clone(), Author::Agent(agent.name.clone()), content.clone())
                        .with_branch(invocation.branch.clone())
                        .with_long_running_tool_ids(long_running);
                    invocation.session.append(model_event.clone()).await;
                    yield Ok(model_event);

                    let calls: Vec<FunctionCall> = content.function_calls().cloned().collect();
                    if calls.is_empty() {
                        terminal = !response.partial && !response.interrupted;
                        continue;
                    }

                    let Some(fr_event) = dispatch_function_calls(invocation, &step_registry, &calls, &HashMap::new()).await else {
                        terminal = false;
                        continue;
                    };

                    if !fr_event.actions.requested_tool_confirmations.is_empty() {
                        let confirmation_event = build_confirmation_event(invocation, &calls, &fr_event.actions.requested_tool_confirmations);
                        invocation.session.append(confirmation_event.clone()).await;
                        yield Ok(confirmation_event);
                    }

                    // A tool call keeps the step going by default; `skip_summarization`
                    // (set when a confirmation was requested, §4.6) makes it a
                    // stopping point instead, pending the next invocation's resume.
                    terminal = fr_event.actions.skip_summarization;

                    invocation.session.append(fr_event.clone()).await;
                    yield Ok(fr_event.clone());

                    for fr in fr_event.content.function_responses() {
                        if fr.name == SET_MODEL_RESPONSE_TOOL_NAME && !fr.is_error() {
                            let payload = Value::Object(fr.response.clone());
                            let text = match serde_json::to_string(&payload) {
                                Ok(text) => text,
                                Err(e) => {
                                    yield Err(FlowError::ConfirmationDecode(e));
                                    return;
                                }
                            };
                            let final_event = Event::new(invocation.invocation_id.clone(), Author::Agent(agent.name.clone()), Content::text(Role::Model, text))
                                .with_branch(invocation.branch.clone());
                            invocation.session.append(final_event.clone()).await;
                            yield Ok(final_event);
                            terminal = true;
                        }
                    }

                    if let Some(target_name) = fr_event.actions.transfer_to_agent.clone() {
                        let target = match self.parents.get(&target_name) {
                            Some(target) => target.clone(),
                            None => {
                                yield Err(FlowError::illegal_transfer(agent.name.clone(), target_name.clone()));
                                return;
                            }
                        };
                        *outcome_slot.lock().expect("outcome mutex poisoned") = Some(StepOutcome::Transfer(target));
                        return;
                    }
                }

                if !has_more {
                    break;
                }
            }

            let outcome = if terminal { StepOutcome::Done } else { StepOutcome::Continue };
            *outcome_slot.lock().expect("outcome mutex poisoned") = Some(outcome);
        })
    }
}

fn build_contents(events: &[Event]) -> Vec<Content> {
    events.iter().filter(|e| !e.content.is_empty()).map(|e| e.content.clone()).collect()
}

fn build_confirmation_event(invocation: &InvocationContext, calls: &[FunctionCall], requested: &HashMap<String, ToolConfirmation>) -> Event {
    let mut parts = Vec::new();
    let mut long_running = Vec::new();
    for fc in calls {
        if let Some(confirmation) = requested.get(&fc.id) {
            let sentinel_id = format!("{SYNTHETIC_ID_PREFIX}{}", uuid::Uuid::new_v4());
            let mut args = Map::new();
            args.insert("originalFunctionCall".to_string(), serde_json::to_value(fc).unwrap_or(Value::Null));
            args.insert("toolConfirmation".to_string(), serde_json::to_value(confirmation).unwrap_or(Value::Null));
            parts.push(Part::FunctionCall(FunctionCall { id: sentinel_id.clone(), name: CONFIRMATION_TOOL_NAME.to_string(), args }));
            long_running.push(sentinel_id);
        }
    }
    Event::new(invocation.invocation_id.clone(), Author::Agent(invocation.agent.name.clone()), Content { role: Some(Role::Model), parts })
        .with_branch(invocation.branch.clone())
        .with_long_running_tool_ids(long_running)
}

/// `call_llm` (§4.2): runs the before/after/on-error model callbacks around
/// one model call and returns a stream of its responses with ids populated,
/// ready for the caller to fold through the `Aggregator` itself if (and only
/// if) the adapter actually produces more than one of them.
async fn call_llm<'a>(invocation: &'a InvocationContext, adapter: &'a dyn ModelAdapter, request: LlmRequest) -> Result<Pin<Box<dyn Stream<Item = Result<LlmResponse>> + Send + 'a>>> {
    for plugin in invocation.plugins.plugins() {
        if let Some(short_circuit) = plugin.before_model(&request).await {
            return Ok(Box::pin(futures::stream::once(async move { Ok(short_circuit) })));
        }
    }

    let span = tracing::info_span!("generate_content", model = %request.model);
    let stream_result = adapter.generate_content(request, invocation.run_config.streaming, Some(invocation.cancellation.clone())).instrument(span).await;
    let mut raw = match stream_result {
        Ok(s) => s,
        Err(e) => {
            return match recover_or_propagate(invocation, &e.to_string()).await {
                Ok(recovered) => Ok(Box::pin(futures::stream::once(async move { Ok(recovered) }))),
                Err(propagated) => Err(propagated),
            };
        }
    };

    Ok(Box::pin(stream! {
        let mut counter: u64 = 0;
        while let Some(item) = raw.next().await {
            let mut response = match item {
                Ok(r) => r,
                Err(e) => match recover_or_propagate(invocation, &e.to_string()).await {
                    Ok(recovered) => recovered,
                    Err(propagated) => {
                        yield Err(propagated);
                        return;
                    }
                },
            };

            if let Some(content) = response.content.as_mut() {
                populate_client_function_call_id(content, &mut || {
                    counter += 1;
                    counter.to_string()
                });
            }

            for plugin in invocation.plugins.plugins() {
                if let Some(replacement) = plugin.after_model(&response).await {
                    response = replacement;
                }
            }

            yield Ok(response);
        }
    }))
}

/// Route a model-adapter-level error message through the On-Model-Error
/// callback chain; `Ok` carries a recovered substitute response, `Err`
/// carries the error to propagate when nothing recovers it.
async fn recover_or_propagate(invocation: &InvocationContext, message: &str) -> std::result::Result<LlmResponse, FlowError> {
    for plugin in invocation.plugins.plugins() {
        if let Some(recovered) = plugin.on_model_error(message).await {
            return Ok(recovered);
        }
    }
    Err(FlowError::Model(message.to_string()))
}
