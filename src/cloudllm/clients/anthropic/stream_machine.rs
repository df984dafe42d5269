//! Adapts a raw Anthropic SSE byte stream into the crate's normalized
//! [`StreamStatus`](crate::cloudllm::provider::StreamStatus) events.
//!
//! Grounded on grafbase-nexus's `provider::anthropic::chat_completion_stream`, which wraps
//! a `reqwest` streaming body in `eventsource_stream` and folds SSE events through
//! `futures::stream::unfold` into a stateful processor. We keep that shape; the state here
//! is trimmed to only what's needed to translate Anthropic's specific event vocabulary,
//! since block-level accumulation (text/thought merging, tool-call byte buffering) is the
//! orchestrator's job once it receives [`StreamStatus`] events.

use crate::cloudllm::content::Thought;
use crate::cloudllm::error::{RuntimeError, RuntimeResult};
use crate::cloudllm::provider::{ContentBlockDelta, ContentBlockStart, ProviderEventStream, StopReason, StreamStatus, Usage};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;

use super::sse::{AnthropicEvent, ContentBlockPayload, DeltaPayload};

fn map_usage(payload: super::sse::UsagePayload) -> Usage {
    Usage {
        input_tokens: payload.input_tokens,
        output_tokens: payload.output_tokens,
        cache_creation_input_tokens: payload.cache_creation_input_tokens,
        cache_read_input_tokens: payload.cache_read_input_tokens,
    }
}

/// Maps a raw `stop_reason` string to a [`StopReason`], per spec.md §9: any value other
/// than `end_turn`/`tool_use` (`max_tokens`, `stop_sequence`, a refusal, or anything
/// unrecognized) is a protocol error rather than a third signal the turn loop understands.
fn map_stop_reason(reason: Option<&str>) -> RuntimeResult<Option<StopReason>> {
    match reason {
        None => Ok(None),
        Some("end_turn") => Ok(Some(StopReason::EndTurn)),
        Some("tool_use") => Ok(Some(StopReason::ToolUse)),
        Some(other) => Err(RuntimeError::ProtocolError {
            detail: format!("unexpected stop reason \"{other}\""),
        }),
    }
}

fn translate(event: AnthropicEvent) -> RuntimeResult<Option<StreamStatus>> {
    match event {
        AnthropicEvent::MessageStart { message } => Ok(Some(StreamStatus::MessageStart {
            id: message.id,
            usage: map_usage(message.usage),
        })),
        AnthropicEvent::ContentBlockStart { index, content_block } => {
            let block = match content_block {
                ContentBlockPayload::Text { .. } => ContentBlockStart::Text,
                ContentBlockPayload::ToolUse { id, name } => ContentBlockStart::ToolUse { id, name },
                ContentBlockPayload::Thinking { thinking } => {
                    let mut thought = Thought::default();
                    if !thinking.is_empty() {
                        thought.text = Some(thinking);
                    }
                    ContentBlockStart::Thought(thought)
                }
                ContentBlockPayload::RedactedThinking { data } => {
                    let encrypted = base64_decode(&data)?;
                    ContentBlockStart::Thought(Thought {
                        encrypted: Some(encrypted),
                        ..Default::default()
                    })
                }
            };
            Ok(Some(StreamStatus::ContentBlockStart { index, block }))
        }
        AnthropicEvent::ContentBlockDelta { index, delta } => {
            let delta = match delta {
                DeltaPayload::TextDelta { text } => ContentBlockDelta::TextDelta(text),
                DeltaPayload::InputJsonDelta { partial_json } => ContentBlockDelta::ToolArgumentDelta(partial_json.into_bytes()),
                DeltaPayload::ThinkingDelta { thinking } => ContentBlockDelta::ThoughtDelta(thinking),
                DeltaPayload::SignatureDelta { signature } => ContentBlockDelta::ThoughtSignature(signature),
            };
            Ok(Some(StreamStatus::ContentBlockDelta { index, delta }))
        }
        AnthropicEvent::ContentBlockStop { index } => Ok(Some(StreamStatus::ContentBlockStop { index })),
        AnthropicEvent::MessageDelta { delta, usage } => Ok(Some(StreamStatus::MessageDelta {
            stop_reason: map_stop_reason(delta.stop_reason.as_deref())?,
            usage: map_usage(usage),
        })),
        AnthropicEvent::MessageStop => Ok(Some(StreamStatus::MessageStop)),
        AnthropicEvent::Ping => Ok(Some(StreamStatus::Ping)),
        AnthropicEvent::Error { error } => Err(RuntimeError::ProviderError {
            kind: error.kind,
            message: error.message,
        }),
    }
}

fn base64_decode(data: &str) -> RuntimeResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.decode(data).map_err(|e| RuntimeError::ProtocolError {
        detail: format!("invalid base64 in redacted_thinking block: {e}"),
    })
}

/// Wrap an Anthropic HTTP streaming `response` body into a [`ProviderEventStream`].
pub fn decode_response(response: Response) -> ProviderEventStream {
    let byte_stream = response.bytes_stream();
    let events = byte_stream.eventsource();

    let mapped = events.filter_map(|frame| async move {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                return Some(Err(RuntimeError::StreamReadError { cause: e.to_string() }));
            }
        };
        if frame.data.is_empty() {
            return None;
        }
        let parsed = match super::sse::parse_event(&frame.data) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("unparseable SSE event, ending stream: {e}");
                return Some(Err(RuntimeError::ProtocolError {
                    detail: format!("malformed SSE event body: {e}"),
                }));
            }
        };
        match translate(parsed) {
            Ok(Some(status)) => Some(Ok(status)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    });

    Box::pin(mapped)
}

/// Exposed for providers/tests that want to translate pre-parsed events without a live
/// HTTP response, e.g. replaying a fixture.
pub fn translate_for_test(event: AnthropicEvent) -> RuntimeResult<Option<StreamStatus>> {
    translate(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::clients::anthropic::sse::{MessageStartPayload, UsagePayload};

    #[test]
    fn message_start_carries_input_usage() {
        let event = AnthropicEvent::MessageStart {
            message: MessageStartPayload {
                id: "msg_1".to_string(),
                usage: UsagePayload { input_tokens: 7, ..Default::default() },
            },
        };
        match translate_for_test(event).unwrap() {
            Some(StreamStatus::MessageStart { id, usage }) => {
                assert_eq!(id, "msg_1");
                assert_eq!(usage.input_tokens, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_event_becomes_provider_error() {
        let event = AnthropicEvent::Error {
            error: super::super::sse::ErrorPayload {
                kind: "overloaded_error".to_string(),
                message: "try again".to_string(),
            },
        };
        let result = translate_for_test(event);
        assert!(matches!(result, Err(RuntimeError::ProviderError { .. })));
    }

    #[test]
    fn stop_reason_maps_known_values() {
        assert_eq!(map_stop_reason(Some("end_turn")).unwrap(), Some(StopReason::EndTurn));
        assert_eq!(map_stop_reason(Some("tool_use")).unwrap(), Some(StopReason::ToolUse));
        assert_eq!(map_stop_reason(None).unwrap(), None);
    }

    #[test]
    fn stop_reason_rejects_max_tokens_as_protocol_error() {
        let result = map_stop_reason(Some("max_tokens"));
        assert!(matches!(result, Err(RuntimeError::ProtocolError { .. })));
    }
}
