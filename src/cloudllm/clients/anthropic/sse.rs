//! Typed decoding of Anthropic Messages API SSE events.
//!
//! Grounded on grafbase-nexus's `protocol::anthropic::messages::sse::StreamEvent` — the
//! teacher has no native Anthropic SSE client of its own (its Claude client delegates to a
//! third-party crate), so this module's shape comes from the pack rather than the teacher.

use serde::Deserialize;
use serde_json::Value as JsonValue;

/// One decoded Anthropic SSE event, named after its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicEvent {
    MessageStart { message: MessageStartPayload },
    ContentBlockStart { index: usize, content_block: ContentBlockPayload },
    ContentBlockDelta { index: usize, delta: DeltaPayload },
    ContentBlockStop { index: usize },
    MessageDelta { delta: MessageDeltaPayload, usage: UsagePayload },
    MessageStop,
    Ping,
    Error { error: ErrorPayload },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartPayload {
    pub id: String,
    #[serde(default)]
    pub usage: UsagePayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsagePayload {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockPayload {
    Text { text: String },
    ToolUse { id: String, name: String },
    Thinking { thinking: String },
    RedactedThinking { data: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaPayload {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaPayload {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Parse one SSE `data:` payload (already stripped of the `event:`/`data:` framing by
/// [`eventsource_stream`]) into an [`AnthropicEvent`].
///
/// Anthropic's stream always carries the event name in the JSON body's own `type` field,
/// so (unlike some SSE APIs) we don't need the separate `event:` line to disambiguate —
/// this mirrors grafbase-nexus's `sse.rs`, which does the same single-source parse.
pub fn parse_event(data: &str) -> Result<AnthropicEvent, serde_json::Error> {
    serde_json::from_str(data)
}

/// Best-effort fallback for bodies that don't match [`AnthropicEvent`]'s known shapes
/// (e.g. a future event type); callers can choose to ignore these by checking `type`.
pub fn event_type_of(data: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(data).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}
