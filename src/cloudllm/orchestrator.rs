//! The turn loop: repeatedly calls the provider, dispatches tool calls, and feeds their
//! results back in until the model stops or a limit is hit (spec.md §4.1).
//!
//! Grounded on the teacher's `agent.rs` turn loop (tool-call-then-continue structure,
//! since removed from this crate in favor of this provider-agnostic version) and on
//! grafbase-nexus's `AnthropicStreamProcessor` for how to fold a normalized event stream
//! into accumulated message state.

use crate::cloudllm::content::{Content, ContentItem};
use crate::cloudllm::config::RuntimeConfig;
use crate::cloudllm::error::{RuntimeError, RuntimeResult};
use crate::cloudllm::hooks::{apply_hook_action, BeforeResponseHook, BeforeResponseView, Debugger};
use crate::cloudllm::message::{Message, ToolCall};
use crate::cloudllm::provider::{ChatRequest, ContentBlockDelta, ContentBlockStart, Provider, ResponseFormat, StopReason, StreamStatus, Usage};
use crate::cloudllm::toolbox::{Runner, ToolContext, Toolbox};
use crate::cloudllm::update::{ToolResult, Update};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Name of the hidden tool the request assembler injects to simulate structured JSON
/// output on providers without a native "json mode" (spec.md §4.4). The orchestrator
/// special-cases a `ToolUse` block under this name: its arguments *are* the final answer,
/// not a call to dispatch through the active [`Toolbox`].
pub const SYNTHETIC_JSON_TOOL_NAME: &str = "__emit_structured_output__";

/// What one call to [`Orchestrator::run`] produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub messages: Vec<Message>,
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    /// Populated only when the turn used JSON-mode simulation; the synthetic tool's
    /// arguments, already merged into `messages` as the final assistant turn's content.
    pub structured_output: Option<serde_json::Value>,
}

/// Everything needed to start a run: the model, the transcript so far, and what the model
/// is allowed to do this turn (tools, response shape).
pub struct RunRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub toolbox: Toolbox,
    pub response_format: ResponseFormat,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
}

impl RunRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        RunRequest {
            model: model.into(),
            messages,
            toolbox: Toolbox::new(),
            response_format: ResponseFormat::Text,
            max_output_tokens: 4096,
            temperature: None,
        }
    }
}

/// Drives turns against a single [`Provider`].
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    config: RuntimeConfig,
    before_response_hook: Option<Arc<dyn BeforeResponseHook>>,
    debugger: Option<Arc<dyn Debugger>>,
}

/// State accumulated while replaying one turn's [`StreamStatus`] events into a finished
/// [`Message`].
struct OpenBlock {
    kind: OpenBlockKind,
}

enum OpenBlockKind {
    Text,
    ToolUse(ToolCall),
    Thought,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, config: RuntimeConfig) -> Self {
        Orchestrator {
            provider,
            config,
            before_response_hook: None,
            debugger: None,
        }
    }

    pub fn with_before_response_hook(mut self, hook: Arc<dyn BeforeResponseHook>) -> Self {
        self.before_response_hook = Some(hook);
        self
    }

    pub fn with_debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    /// Run the turn loop to completion, emitting [`Update`]s on `update_tx` as they occur.
    /// Returns once the model stops without requesting further tool calls, `max_turns` is
    /// reached, or `cancellation` fires.
    pub async fn run(
        &self,
        request: RunRequest,
        cancellation: CancellationToken,
        update_tx: mpsc::UnboundedSender<Update>,
    ) -> RuntimeResult<RunOutcome> {
        if !request.toolbox.is_empty() && matches!(request.response_format, ResponseFormat::Json(_)) {
            return Err(RuntimeError::ToolsAndJsonConflict);
        }
        request
            .toolbox
            .validate_choice()
            .map_err(|detail| RuntimeError::ProtocolError { detail })?;

        let mut messages = request.messages;
        let mut total_usage = Usage::default();
        let mut last_stop_reason = None;
        let mut structured_output = None;
        let deadline_at = self.config.turn_deadline.map(|d| tokio::time::Instant::now() + d);

        // `max_turns == 0` means unlimited (spec.md §4.1 step 1); a plain `1..=max_turns`
        // range would instead run zero turns, so the limit is checked explicitly below
        // rather than driving the loop bound.
        let mut turn: u32 = 1;
        loop {
            if cancellation.is_cancelled() {
                return Err(RuntimeError::ContextCancelled);
            }

            log::debug!("starting turn {turn} (max_turns={})", self.config.max_turns);

            if let Some(hook) = &self.before_response_hook {
                let view = BeforeResponseView::new(turn, &mut messages);
                let action = hook.before_response(view).await;
                apply_hook_action(&mut messages, action).map_err(|cause| RuntimeError::BeforeResponseAborted { cause })?;
            }

            let chat_request = self.assemble_request(&request, &messages, turn);
            let turn_future = self.run_one_turn(chat_request, &request.toolbox, &cancellation, &update_tx);
            let turn_result = match deadline_at {
                Some(deadline) => match tokio::time::timeout_at(deadline, turn_future).await {
                    Ok(result) => result?,
                    Err(_) => {
                        log::warn!("turn deadline elapsed during turn {turn}");
                        return Err(RuntimeError::DeadlineExceeded);
                    }
                },
                None => turn_future.await?,
            };

            let mut turn_usage = Usage::default();
            turn_usage.merge_cumulative(turn_result.usage_start, turn_result.usage_delta);
            total_usage.add_delta(turn_usage);
            last_stop_reason = turn_result.stop_reason;

            messages.push(turn_result.assistant_message);

            if let Some(value) = turn_result.structured_output {
                structured_output = Some(value);
                break;
            }

            if turn_result.tool_calls.is_empty() {
                break;
            }

            for call in &turn_result.tool_calls {
                if cancellation.is_cancelled() {
                    return Err(RuntimeError::ContextCancelled);
                }
                let (status_tx, mut status_rx) = mpsc::unbounded_channel();
                let context = ToolContext::new(call.id.clone(), status_tx);
                let dispatch = Runner::run(&request.toolbox, call, context);
                tokio::pin!(dispatch);
                let result = loop {
                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => return Err(RuntimeError::ContextCancelled),
                        Some((id, status)) = status_rx.recv() => {
                            let _ = update_tx.send(Update::ToolStatus { id, tool: call.name.clone(), status });
                        }
                        outcome = &mut dispatch => break outcome,
                    }
                };
                let _ = update_tx.send(Update::ToolDone {
                    id: call.id.clone(),
                    tool: call.name.clone(),
                    result: result.clone(),
                    metadata: None,
                });
                let (tool_content, hoisted_images) = tool_result_to_content(&result);
                messages.push(Message::tool_result(call, tool_content));
                if !hoisted_images.is_empty() {
                    messages.push(Message::user_image_hoist(hoisted_images));
                }
            }

            if self.config.max_turns > 0 && turn >= self.config.max_turns {
                log::warn!("max_turns ({}) reached after turn {turn}", self.config.max_turns);
                return Err(RuntimeError::MaxTurnsReached);
            }
            turn += 1;
        }

        Ok(RunOutcome {
            messages,
            usage: total_usage,
            stop_reason: last_stop_reason,
            structured_output,
        })
    }

    fn assemble_request(&self, request: &RunRequest, messages: &[Message], _turn: u32) -> ChatRequest {
        let mut chat_request = ChatRequest::new(request.model.clone(), messages.to_vec());
        chat_request.tools = request.toolbox.schemas();
        chat_request.tool_choice = request.toolbox.choice.clone();
        chat_request.response_format = request.response_format.clone();
        chat_request.max_output_tokens = request.max_output_tokens;
        chat_request.thinking_budget_tokens = self.config.thinking_budget_tokens;
        chat_request.temperature = request.temperature;
        chat_request
    }

    async fn run_one_turn(
        &self,
        chat_request: ChatRequest,
        toolbox: &Toolbox,
        cancellation: &CancellationToken,
        update_tx: &mpsc::UnboundedSender<Update>,
    ) -> RuntimeResult<TurnResult> {
        let mut stream = self.provider.stream(chat_request).await?;

        let mut content = Content::new();
        let mut open_blocks: Vec<OpenBlock> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage_start = Usage::default();
        let mut usage_delta = Usage::default();
        let mut stop_reason = None;
        let mut message_id = String::new();
        let mut structured_output = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(RuntimeError::ContextCancelled),
                event = stream.next() => event,
            };
            let Some(event) = next else { break };
            let event = event?;

            if let Some(debugger) = &self.debugger {
                debugger.on_event(&event);
            }

            match event {
                StreamStatus::MessageStart { id, usage } => {
                    message_id = id.clone();
                    usage_start = usage;
                    let _ = update_tx.send(Update::MessageStart { id });
                }
                StreamStatus::ContentBlockStart { index, block } => {
                    self.open_block(&mut content, &mut open_blocks, index, block, toolbox, update_tx)?;
                }
                StreamStatus::ContentBlockDelta { index, delta } => {
                    self.apply_delta(&mut content, &mut open_blocks, index, delta, update_tx)?;
                }
                StreamStatus::ContentBlockStop { index } => {
                    if let Some(OpenBlockKind::ToolUse(call)) = open_blocks.get(index).map(|b| &b.kind) {
                        if call.name == SYNTHETIC_JSON_TOOL_NAME {
                            structured_output = Some(call.arguments_json().map_err(|e| RuntimeError::ProtocolError {
                                detail: format!("synthetic JSON tool produced invalid JSON: {e}"),
                            })?);
                        } else {
                            tool_calls.push(call.clone());
                        }
                    }
                    if let Some(OpenBlockKind::Thought) = open_blocks.get(index).map(|b| &b.kind) {
                        let id = content.thought_at_mut(index).and_then(|t| t.id.clone());
                        let _ = update_tx.send(Update::ThinkingDone { id });
                    }
                }
                StreamStatus::MessageDelta { stop_reason: reason, usage } => {
                    stop_reason = reason;
                    usage_delta = usage;
                }
                StreamStatus::MessageStop => break,
                StreamStatus::Ping => {}
            }
        }

        let mut assistant_message = Message::assistant(content);
        assistant_message.id = Some(message_id);
        assistant_message.tool_calls = tool_calls.clone();

        Ok(TurnResult {
            assistant_message,
            tool_calls,
            usage_start,
            usage_delta,
            stop_reason,
            structured_output,
        })
    }

    fn open_block(
        &self,
        content: &mut Content,
        open_blocks: &mut Vec<OpenBlock>,
        index: usize,
        block: ContentBlockStart,
        toolbox: &Toolbox,
        update_tx: &mpsc::UnboundedSender<Update>,
    ) -> RuntimeResult<()> {
        debug_assert_eq!(index, open_blocks.len(), "provider content block indices must arrive sequentially");
        match block {
            ContentBlockStart::Text => {
                content.push(ContentItem::text(""));
                open_blocks.push(OpenBlock { kind: OpenBlockKind::Text });
            }
            ContentBlockStart::ToolUse { id, name } => {
                if id.is_empty() {
                    return Err(RuntimeError::MissingToolCallId { tool_name: name });
                }
                if name == SYNTHETIC_JSON_TOOL_NAME {
                    // The synthetic JSON tool is never surfaced to callers as a real tool
                    // call (spec.md §8, Testable Property 5): its argument stream is
                    // reported as ordinary `Text` updates instead of `ToolStart`/`ToolDelta`.
                    content.push(ContentItem::text(""));
                } else {
                    if toolbox.get(&name).is_none() {
                        return Err(RuntimeError::ToolNotFound { tool_name: name });
                    }
                    let _ = update_tx.send(Update::ToolStart {
                        id: id.clone(),
                        tool: name.clone(),
                    });
                }
                open_blocks.push(OpenBlock {
                    kind: OpenBlockKind::ToolUse(ToolCall::new(id, name)),
                });
            }
            ContentBlockStart::Thought(thought) => {
                content.push_new_thought(thought);
                open_blocks.push(OpenBlock { kind: OpenBlockKind::Thought });
            }
        }
        Ok(())
    }

    fn apply_delta(
        &self,
        content: &mut Content,
        open_blocks: &mut [OpenBlock],
        index: usize,
        delta: ContentBlockDelta,
        update_tx: &mpsc::UnboundedSender<Update>,
    ) -> RuntimeResult<()> {
        let Some(block) = open_blocks.get_mut(index) else {
            return Err(RuntimeError::ProtocolError {
                detail: format!("content delta for unopened block index {index}"),
            });
        };
        match (&mut block.kind, delta) {
            (OpenBlockKind::Text, ContentBlockDelta::TextDelta(text)) => {
                content.push_text(&text);
                let _ = update_tx.send(Update::Text { text });
            }
            (OpenBlockKind::ToolUse(call), ContentBlockDelta::ToolArgumentDelta(bytes)) => {
                call.push_argument_bytes(&bytes);
                if call.name == SYNTHETIC_JSON_TOOL_NAME {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    content.push_text(&text);
                    let _ = update_tx.send(Update::Text { text });
                } else {
                    let _ = update_tx.send(Update::ToolDelta { id: call.id.clone(), bytes });
                }
            }
            (OpenBlockKind::Thought, ContentBlockDelta::ThoughtDelta(text)) => {
                content.push_thought_text(&text);
                let id = content.thought_at_mut(index).and_then(|t| t.id.clone());
                let _ = update_tx.send(Update::Thinking { id, thought: text });
            }
            (OpenBlockKind::Thought, ContentBlockDelta::ThoughtSignature(sig)) => {
                if let Some(thought) = content.thought_at_mut(index) {
                    thought.signature = Some(sig);
                }
            }
            _ => {
                return Err(RuntimeError::ProtocolError {
                    detail: format!("delta kind did not match open block kind at index {index}"),
                });
            }
        }
        Ok(())
    }
}

struct TurnResult {
    assistant_message: Message,
    tool_calls: Vec<ToolCall>,
    usage_start: Usage,
    usage_delta: Usage,
    stop_reason: Option<StopReason>,
    structured_output: Option<serde_json::Value>,
}

/// Splits a finished tool's result into the content that belongs on the `tool`-role
/// message itself and the content of a synthetic adjacent user message, if any (spec.md
/// §3, §4.1 step 8, §9). Anthropic's `tool_result` blocks can't carry images, so any image
/// parts are always hoisted out rather than left on the tool message.
fn tool_result_to_content(result: &ToolResult) -> (Content, Content) {
    let mut content = Content::new();
    if let Some(value) = &result.value {
        content.push(ContentItem::json(value.clone()));
    }
    if let Some(error) = &result.error {
        content.push_text(&format!("error: {error}"));
    }

    let mut hoisted = Content::new();
    let count = result.image_urls.len();
    for (index, url) in result.image_urls.iter().enumerate() {
        let image_name = if count > 1 { format!("image {}", index + 1) } else { "the image".to_string() };
        hoisted.push_text(&format!("Here is {image_name}. This is an automated message, not actually from the user."));
        hoisted.push(ContentItem::image_url(url.clone(), None));
    }
    (content, hoisted)
}
