//! Message and tool-call data model (spec.md §3).

use crate::cloudllm::content::Content;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A model-generated invocation of a registered tool.
///
/// Identity (`id`) is immutable once assigned and is required: spec.md §3 calls out that
/// the stream state machine may build `arguments` incrementally as delta bytes arrive, but
/// `id` never changes once a `ToolCall` exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Non-empty provider-assigned call id, correlating a later tool-role message back to
    /// this call.
    pub id: String,
    /// Name of the tool being invoked; must match a key in the active [`Toolbox`](crate::toolbox::Toolbox).
    pub name: String,
    /// Raw JSON argument bytes, possibly incomplete while `arguments` is still streaming.
    #[serde(default, with = "arguments_as_string")]
    pub arguments: Vec<u8>,
    /// Opaque provider-specific bookkeeping (e.g. vendor item ids for reasoning
    /// continuity) forwarded unchanged across turns.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Append raw argument bytes as they stream in.
    pub fn push_argument_bytes(&mut self, bytes: &[u8]) {
        self.arguments.extend_from_slice(bytes);
    }

    /// Parse the accumulated argument bytes as JSON.
    pub fn arguments_json(&self) -> serde_json::Result<serde_json::Value> {
        if self.arguments.is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::from_slice(&self.arguments)
    }
}

/// Serializes `arguments` as a JSON string (for readability in persisted transcripts)
/// while keeping the in-memory representation as raw bytes, which is what the streaming
/// state machine actually accumulates.
mod arguments_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let s = String::from_utf8_lossy(bytes);
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.into_bytes())
    }
}

/// A single turn in the conversation transcript (spec.md §3).
///
/// Invariants enforced by construction helpers, not by the type system alone:
/// `tool_calls` is only meaningful on assistant messages, and `tool_call_id` /
/// `tool_call_name` are only meaningful on tool messages and must reference a prior
/// assistant tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<Content>) -> Self {
        Message {
            role: Role::User,
            id: None,
            name: None,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_call_name: None,
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Message {
            role: Role::System,
            ..Message::user(content)
        }
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Message {
            role: Role::Assistant,
            ..Message::user(content)
        }
    }

    /// Build the tool-result message that follows a [`ToolCall`], per spec.md §3: its
    /// content is the tool's result content (JSON plus optional images), and
    /// `tool_call_id` references the call it answers.
    pub fn tool_result(call: &ToolCall, content: impl Into<Content>) -> Self {
        Message {
            role: Role::Tool,
            id: None,
            name: None,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            tool_call_name: Some(call.name.clone()),
        }
    }

    /// Build a synthetic user message carrying images hoisted out of a tool result for a
    /// provider that can't carry images in `tool_result` blocks (spec.md §3, §4.1 step 8,
    /// §9). Tagged via `name` so the transcript pattern in spec.md §8 Testable Property 3
    /// (`user_image_hoist`) can be told apart from a genuine user turn.
    pub fn user_image_hoist(content: impl Into<Content>) -> Self {
        Message {
            name: Some("user_image_hoist".to_string()),
            ..Message::user(content)
        }
    }

    /// True for a synthetic message built by [`Message::user_image_hoist`].
    pub fn is_image_hoist(&self) -> bool {
        self.role == Role::User && self.name.as_deref() == Some("user_image_hoist")
    }

    pub fn is_empty_content(&self) -> bool {
        self.content.without_blank_text().is_empty()
    }
}
