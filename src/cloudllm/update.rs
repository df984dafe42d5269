//! The caller-facing stream of events a turn emits (spec.md §6).
//!
//! `Update` is deliberately flatter than the wire protocols it's derived from: callers
//! building a UI shouldn't need to know whether they're talking to Claude or Gemini to
//! render a streaming answer.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Progress of a tool call still executing, surfaced by long-running tools via
/// [`crate::toolbox::ToolContext::report_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Label a tool result carries when the call never reached the tool itself because the
/// model's own request was malformed (unknown tool, bad JSON, schema violation) — spec.md
/// §4.3 step 2's fixed label for this case.
pub const LLM_MISBEHAVED_LABEL: &str = "LLM misbehaved";

/// The outcome content of a finished tool call, handed back to the provider as the next
/// tool-role message (spec.md §3, §4.3).
///
/// `label` is a short human-readable description of what happened, always present — spec.md
/// §4.3 step 5's `{ label, content, error? }` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolResult {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(label: impl Into<String>, value: JsonValue) -> Self {
        ToolResult {
            label: label.into(),
            value: Some(value),
            image_urls: Vec::new(),
            error: None,
        }
    }

    pub fn error(label: impl Into<String>, message: impl Into<String>) -> Self {
        ToolResult {
            label: label.into(),
            value: None,
            image_urls: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Shorthand for the fixed-label validation-failure case (spec.md §4.3 step 2).
    pub fn llm_misbehaved(message: impl Into<String>) -> Self {
        ToolResult::error(LLM_MISBEHAVED_LABEL, message)
    }
}

/// One event in the stream a turn produces, in the order it occurred.
///
/// Tagged by `kind` on the wire so a caller persisting a raw update log (for replay or
/// debugging) gets a stable, self-describing shape — see spec.md §6 "Update JSON form".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Update {
    /// The assistant message for this turn has begun; `id` is the provider-assigned
    /// message id, used for correlating later provider-side events if needed.
    MessageStart { id: String },
    /// A text delta to append to the visible answer.
    Text { text: String },
    /// An image the model produced inline.
    Image { url: String, mime: Option<String> },
    /// A reasoning-trace delta. `id` identifies which thought block this belongs to, so
    /// interleaved thoughts (rare, but legal on some providers) don't get scrambled.
    Thinking { id: Option<String>, thought: String },
    /// The current thought block is complete.
    ThinkingDone { id: Option<String> },
    /// A tool call has begun; `id` is stable for the remainder of this call's lifetime.
    ToolStart { id: String, tool: String },
    /// Raw argument bytes for `id`, to be appended in order.
    ToolDelta {
        id: String,
        #[serde(with = "bytes_as_string")]
        bytes: Vec<u8>,
    },
    /// A progress update emitted by a still-running tool.
    ToolStatus {
        id: String,
        tool: String,
        status: ToolStatus,
    },
    /// A tool call has finished and produced a result (or an error).
    ToolDone {
        id: String,
        tool: String,
        result: ToolResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<JsonValue>,
    },
}

mod bytes_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}
