//! The uniform content model shared by every provider.
//!
//! A [`Message`](crate::message::Message) body is not a plain string: it is an ordered
//! [`Content`] list of tagged [`ContentItem`]s so that text, images, structured JSON,
//! model "thinking" traces, and cache hints can be interleaved and round-tripped through
//! JSON without losing shape. See `spec.md` §3 for the invariants this module implements.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// How long a provider should retain a cached prefix for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDuration {
    /// Roughly five minutes.
    Short,
    /// Roughly one hour.
    Long,
}

/// A single reasoning trace segment.
///
/// Thoughts come in two flavors: plaintext summaries that stream like text, and opaque
/// "redacted" blocks the provider asks us to echo back unmodified on later turns. The two
/// are never merged into each other (spec.md §3, "Thoughts with encrypted payloads are
/// never merged").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    /// Provider-supplied identifier for this reasoning block, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Plaintext reasoning text, accumulated across deltas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Opaque encrypted payload for a "redacted" reasoning block. When present, this
    /// thought must never be merged with an adjacent one or mutated further.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<Vec<u8>>,
    /// Cryptographic signature accompanying a plaintext thought, used by the provider to
    /// verify the trace was not tampered with across turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// True once the thought is a complete summary rather than an in-progress fragment.
    #[serde(default)]
    pub summary: bool,
}

impl Thought {
    /// A thought carrying an opaque encrypted payload is frozen: it is never merged with
    /// an adjacent thought and its text is never appended to.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted.is_some()
    }

    fn append_text(&mut self, delta: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(delta),
            None => self.text = Some(delta.to_string()),
        }
    }
}

/// One element of a message's [`Content`] list.
///
/// Tagged on the wire by `type`; see spec.md §6 "Content JSON form".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Arbitrary UTF-8 text. Adjacent non-encrypted text items are merged by
    /// [`Content::push_text`].
    Text { text: String },
    /// A remote image URL or a `data:<mime>;base64,<payload>` URI.
    ImageUrl { url: String, mime: Option<String> },
    /// A raw JSON value, typically a tool result payload or a structured-output chunk.
    Json { value: JsonValue },
    /// A model reasoning trace segment.
    Thought(Thought),
    /// A marker instructing the next serialization pass to attach caching metadata to the
    /// *preceding* item. Never itself becomes a provider-side content block.
    CacheHint { duration: CacheDuration },
}

impl ContentItem {
    /// Construct a plain text item.
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text { text: text.into() }
    }

    /// Construct an image item, inferring nothing about the URL shape — callers may pass
    /// either a remote URL or a `data:` URI.
    pub fn image_url(url: impl Into<String>, mime: Option<String>) -> Self {
        ContentItem::ImageUrl {
            url: url.into(),
            mime,
        }
    }

    /// Construct a JSON payload item.
    pub fn json(value: JsonValue) -> Self {
        ContentItem::Json { value }
    }

    /// True for a text item that contains only whitespace (or is empty). Per spec.md §3,
    /// such items are dropped when serializing a provider request.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, ContentItem::Text { text } if text.trim().is_empty())
    }
}

/// An ordered sequence of [`ContentItem`]s — the body of a [`Message`](crate::message::Message).
///
/// Maintains the append/merge invariants from spec.md §3: consecutive non-encrypted text
/// (or thought) items collapse into one, and a blank trailing append is still tracked so
/// later appends keep merging into it.
///
/// Deserializes from either an ordered array of tagged items, a bare string (treated as a
/// single text item), or `null` (treated as empty) — spec.md §3's "JSON (de)serialization"
/// rule for [`Message`](crate::message::Message) content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Content(pub Vec<ContentItem>);

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Array(Vec<ContentItem>),
            Bare(String),
            Null,
        }

        // serde's untagged enum handles `null` by matching `Option<Shape>` at the call
        // site instead, since `null` doesn't deserialize into any of the above variants
        // directly on all formats; handle it explicitly first.
        let value = JsonValue::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Content::new());
        }
        match serde_json::from_value::<Shape>(value).map_err(serde::de::Error::custom)? {
            Shape::Array(items) => Ok(Content(items)),
            Shape::Bare(text) => Ok(Content::from_text(text)),
            Shape::Null => Ok(Content::new()),
        }
    }
}

impl Content {
    /// An empty content list.
    pub fn new() -> Self {
        Content(Vec::new())
    }

    /// A content list holding a single text item — the common case for user turns.
    pub fn from_text(text: impl Into<String>) -> Self {
        Content(vec![ContentItem::text(text)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContentItem> {
        self.0.iter()
    }

    pub fn push(&mut self, item: ContentItem) {
        self.0.push(item);
    }

    /// Append a text delta, extending the trailing text item if one exists and is not
    /// encrypted (text items are never encrypted, so this only ever checks item kind),
    /// otherwise starting a new one. This is spec.md §3's "Append-text" rule.
    pub fn push_text(&mut self, delta: &str) {
        if let Some(ContentItem::Text { text }) = self.0.last_mut() {
            text.push_str(delta);
        } else {
            self.0.push(ContentItem::text(delta));
        }
    }

    /// Append a delta to the trailing thought item, extending it if the last item is a
    /// non-encrypted thought, otherwise starting a new one. This is spec.md §3's
    /// "Append-thought" rule.
    pub fn push_thought_text(&mut self, delta: &str) {
        if let Some(ContentItem::Thought(t)) = self.0.last_mut() {
            if !t.is_encrypted() {
                t.append_text(delta);
                return;
            }
        }
        let mut t = Thought::default();
        t.append_text(delta);
        self.0.push(ContentItem::Thought(t));
    }

    /// Start a brand new thought block (used on `content_block_start` for `thinking` and
    /// `redacted_thinking` events), returning its index in the content list.
    pub fn push_new_thought(&mut self, thought: Thought) -> usize {
        self.0.push(ContentItem::Thought(thought));
        self.0.len() - 1
    }

    /// Mutable access to the thought at `index`, if that slot holds one.
    pub fn thought_at_mut(&mut self, index: usize) -> Option<&mut Thought> {
        match self.0.get_mut(index) {
            Some(ContentItem::Thought(t)) => Some(t),
            _ => None,
        }
    }

    /// Drop blank trailing-whitespace-only text items (spec.md §3) — used by request
    /// assemblers before sending content to a provider. Cache hints are left untouched;
    /// the assembler is responsible for consuming them.
    pub fn without_blank_text(&self) -> Content {
        Content(
            self.0
                .iter()
                .filter(|item| !item.is_blank_text())
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Display for Content {
    /// Renders the concatenation of all text items, ignoring non-text content. Handy for
    /// logging and for callers who only care about the textual answer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.0 {
            if let ContentItem::Text { text } = item {
                f.write_str(text)?;
            }
        }
        Ok(())
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::from_text(value)
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::from_text(value)
    }
}

impl From<Vec<ContentItem>> for Content {
    fn from(value: Vec<ContentItem>) -> Self {
        Content(value)
    }
}
