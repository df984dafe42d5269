//! The seam between the turn loop and a concrete wire protocol (spec.md §4.1, §4.2, §4.5).
//!
//! A [`Provider`] turns a provider-agnostic [`ChatRequest`] into a stream of
//! [`StreamStatus`] events. The orchestrator never sees Anthropic's `content_block_delta`
//! or Gemini's `candidates[].content.parts[]` directly — each provider's `sse.rs` /
//! `stream_machine.rs` (see `clients/anthropic/`) is responsible for normalizing onto this
//! type, grounded on grafbase-nexus's `provider::anthropic::chat_completion_stream` /
//! `protocol::anthropic::messages::sse::StreamEvent` shape.

use crate::cloudllm::content::Thought;
use crate::cloudllm::error::RuntimeResult;
use crate::cloudllm::message::{Message, ToolCall};
use crate::cloudllm::schema::{FunctionSchema, ValueSchema};
use crate::cloudllm::toolbox::Choice;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Token accounting for one turn (spec.md §4.5's usage table).
///
/// Anthropic reports usage twice per turn: `message_start` carries a cumulative snapshot
/// (already-known input tokens, zeroed output tokens) and `message_delta` carries a
/// cumulative *output* total as the turn progresses — never a per-event delta. So
/// `merge_from_message_start` and `merge_from_message_delta` both replace rather than add;
/// the distinction exists because a provider that instead reports true incremental deltas
/// (summed, not replaced) would need a third variant here rather than silently producing
/// wrong totals under this type's current merge rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Apply a `message_start` snapshot: input/cache counters are authoritative from here
    /// on, output starts at whatever the provider reports (usually 0).
    pub fn merge_from_message_start(&mut self, snapshot: Usage) {
        self.input_tokens = snapshot.input_tokens;
        self.cache_creation_input_tokens = snapshot.cache_creation_input_tokens;
        self.cache_read_input_tokens = snapshot.cache_read_input_tokens;
        self.output_tokens = snapshot.output_tokens;
    }

    /// Apply a `message_delta` cumulative update: only `output_tokens` is meaningful here
    /// on Anthropic's wire protocol, and it replaces (not adds to) the running total.
    pub fn merge_from_message_delta(&mut self, cumulative_output: Usage) {
        self.output_tokens = cumulative_output.output_tokens;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Apply a `message_start` snapshot then a `message_delta` cumulative update in one
    /// step, producing the turn's final `Usage` from its two within-turn reports.
    pub fn merge_cumulative(&mut self, start: Usage, delta: Usage) {
        self.merge_from_message_start(start);
        self.merge_from_message_delta(delta);
    }

    /// Add another turn's final usage into this running total (spec.md §8 Testable
    /// Property 4: `session.total_usage` is the *sum* of each turn's `Usage`, unlike the
    /// replace-semantics merges above that apply within a single turn's own snapshots).
    pub fn add_delta(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

/// Why the model stopped generating for this turn.
///
/// Only the two reasons the turn loop knows how to continue from are represented here.
/// Any other `stop_reason` the provider reports (`max_tokens`, `stop_sequence`, a content
/// refusal, or an unrecognized value) is treated as
/// [`crate::error::RuntimeError::ProtocolError`] at the point it's decoded, per spec.md
/// §9 — it never reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
}

/// What kind of content block a provider just opened, as reported by `content_block_start`
/// (Anthropic's term; normalized here for every provider).
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlockStart {
    Text,
    ToolUse { id: String, name: String },
    Thought(Thought),
}

/// An incremental update to an open content block.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlockDelta {
    TextDelta(String),
    ToolArgumentDelta(Vec<u8>),
    ThoughtDelta(String),
    ThoughtSignature(String),
}

/// One normalized event out of a provider's stream, in wire order (spec.md §4.2).
///
/// This is the internal vocabulary the stream state machine consumes to build up
/// `Content`/`Message` and in turn emit [`crate::update::Update`]s to the caller — it is
/// intentionally closer to the wire than `Update` is, since the state machine needs the
/// index correlation raw block events carry.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    MessageStart { id: String, usage: Usage },
    ContentBlockStart { index: usize, block: ContentBlockStart },
    ContentBlockDelta { index: usize, delta: ContentBlockDelta },
    ContentBlockStop { index: usize },
    MessageDelta { stop_reason: Option<StopReason>, usage: Usage },
    MessageStop,
    Ping,
}

/// What shape the model's final answer must take (spec.md §4.4's "structured output"
/// feature, layered under whatever tools are also offered).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    Json(ValueSchema),
}

impl Default for ResponseFormat {
    fn default() -> Self {
        ResponseFormat::Text
    }
}

/// A provider-agnostic description of one turn's request, assembled by the orchestrator
/// from the running transcript plus the active toolbox (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<FunctionSchema>,
    pub tool_choice: Choice,
    pub response_format: ResponseFormat,
    pub max_output_tokens: u32,
    pub thinking_budget_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        ChatRequest {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: Choice::Any,
            response_format: ResponseFormat::Text,
            max_output_tokens: 4096,
            thinking_budget_tokens: None,
            temperature: None,
        }
    }
}

/// A stream of normalized provider events for one in-flight turn.
pub type ProviderEventStream = BoxStream<'static, RuntimeResult<StreamStatus>>;

/// A concrete wire protocol implementation — Anthropic, OpenAI, Gemini, or a test double.
///
/// Grounded on the teacher's `LLMClientWrapper` trait (`client_wrapper.rs`), generalized
/// from a single `send_message`/whole-response call into a streaming interface so the
/// orchestrator can surface [`crate::update::Update`]s as they arrive rather than after the
/// whole turn completes.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A short identifier for error messages and logging, e.g. `"anthropic"`.
    fn name(&self) -> &str;

    /// Send `request` and return a stream of normalized events. The stream ends (with no
    /// further polls) after a `MessageStop` event or an `Err`.
    async fn stream(&self, request: ChatRequest) -> RuntimeResult<ProviderEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_delta_replaces_rather_than_accumulates() {
        let mut usage = Usage::default();
        usage.merge_from_message_start(Usage {
            input_tokens: 100,
            ..Default::default()
        });
        usage.merge_from_message_delta(Usage {
            output_tokens: 12,
            ..Default::default()
        });
        usage.merge_from_message_delta(Usage {
            output_tokens: 30,
            ..Default::default()
        });
        assert_eq!(usage.output_tokens, 30);
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.total_tokens(), 130);
    }

    #[test]
    fn add_delta_sums_across_turns() {
        let turn1 = Usage { input_tokens: 5, output_tokens: 1, ..Default::default() };
        let turn2 = Usage { input_tokens: 5, output_tokens: 1, ..Default::default() };
        let mut total = Usage::default();
        total.add_delta(turn1);
        total.add_delta(turn2);
        assert_eq!(total.input_tokens, 10);
        assert_eq!(total.output_tokens, 2);
    }

    #[test]
    fn merge_cumulative_combines_start_and_delta_within_a_turn() {
        let mut usage = Usage::default();
        usage.merge_cumulative(
            Usage { input_tokens: 100, ..Default::default() },
            Usage { output_tokens: 12, ..Default::default() },
        );
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 12);
    }
}
