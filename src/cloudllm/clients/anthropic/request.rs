//! Turns a provider-agnostic [`ChatRequest`](crate::cloudllm::provider::ChatRequest) into
//! an Anthropic Messages API request body (spec.md §4.5).

use crate::cloudllm::content::{CacheDuration, Content, ContentItem};
use crate::cloudllm::message::{Message, Role};
use crate::cloudllm::orchestrator::SYNTHETIC_JSON_TOOL_NAME;
use crate::cloudllm::provider::{ChatRequest, ResponseFormat};
use crate::cloudllm::schema::ValueSchema;
use crate::cloudllm::toolbox::Choice;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::{json, Value as JsonValue};

/// Build the JSON body Anthropic's `POST /v1/messages` expects for `request`.
///
/// System messages are pulled out of `messages` into the top-level `system` field, since
/// Anthropic (unlike OpenAI/Gemini) does not accept a `system`-role message in the turn
/// array. Non-empty toolboxes and `ResponseFormat::Json` can't both be set — the
/// orchestrator already rejects that combination before assembly is reached, so JSON mode
/// is simulated here only when `request.tools` is empty.
pub fn build_request_body(request: &ChatRequest) -> JsonValue {
    let (system, turns) = split_system_messages(&request.messages);

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_output_tokens,
        "messages": turns.iter().map(render_message).collect::<Vec<_>>(),
        "stream": true,
    });

    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(budget) = request.thinking_budget_tokens {
        body["thinking"] = json!({ "type": "enabled", "budget_tokens": budget });
    }

    match &request.response_format {
        ResponseFormat::Text => {
            if !request.tools.is_empty() {
                let (tools, tool_choice) = render_tools_and_choice(&request.tools, &request.tool_choice);
                body["tools"] = json!(tools
                    .iter()
                    .map(|t| render_tool(&t.name, &t.description, &t.parameters))
                    .collect::<Vec<_>>());
                body["tool_choice"] = tool_choice;
            }
        }
        ResponseFormat::Json(schema) => {
            // No native JSON mode on the Messages API: force a single synthetic tool call
            // whose arguments ARE the structured answer (spec.md §4.4).
            body["tools"] = json!([render_tool(
                SYNTHETIC_JSON_TOOL_NAME,
                "Emit the final structured answer. Always call this exactly once to finish.",
                &schema.normalized_for_strict_mode(),
            )]);
            body["tool_choice"] = json!({ "type": "tool", "name": SYNTHETIC_JSON_TOOL_NAME });
        }
    }

    body
}

/// Implements spec.md §4.5's `Toolbox.choice` → (`tools`, `tool_choice`) mapping. Filtering
/// happens here rather than in `Toolbox` itself, since "filter the tools list to S" is a
/// property of this one request body, not of the toolbox's own state.
fn render_tools_and_choice<'a>(tools: &'a [crate::cloudllm::schema::FunctionSchema], choice: &Choice) -> (Vec<&'a crate::cloudllm::schema::FunctionSchema>, JsonValue) {
    let all: Vec<&crate::cloudllm::schema::FunctionSchema> = tools.iter().collect();
    match choice {
        Choice::Any => (all, json!({ "type": "auto" })),
        Choice::AllowOnly(names) if names.is_empty() => (all, json!({ "type": "none" })),
        Choice::AllowOnly(names) => {
            let filtered: Vec<_> = all.into_iter().filter(|t| names.contains(&t.name)).collect();
            (filtered, json!({ "type": "auto" }))
        }
        Choice::RequireOneOf(names) if names.is_empty() => (all, json!({ "type": "none" })),
        Choice::RequireOneOf(names) if names.len() == 1 => (all, json!({ "type": "tool", "name": names[0] })),
        Choice::RequireOneOf(names) => {
            let filtered: Vec<_> = all.into_iter().filter(|t| names.contains(&t.name)).collect();
            (filtered, json!({ "type": "any" }))
        }
    }
}

fn render_tool(name: &str, description: &str, parameters: &ValueSchema) -> JsonValue {
    json!({
        "name": name,
        "description": description,
        "input_schema": parameters,
    })
}

/// Anthropic wants `system` as a single string (or an array of cacheable blocks); we
/// render it as the concatenation of every `Role::System` message's text, each separated
/// by a blank line, and strip those messages out of the turn array.
fn split_system_messages(messages: &[Message]) -> (String, Vec<&Message>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        if message.role == Role::System {
            system_parts.push(message.content.to_string());
        } else {
            turns.push(message);
        }
    }
    (system_parts.join("\n\n"), turns)
}

fn render_message(message: &&Message) -> JsonValue {
    let role = match message.role {
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
        Role::System => unreachable!("system messages are split out before rendering"),
    };

    let mut blocks = Vec::new();
    if message.role == Role::Tool {
        blocks.push(render_tool_result_block(message));
    } else {
        blocks.extend(render_content(&message.content));
        for call in &message.tool_calls {
            blocks.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.arguments_json().unwrap_or_else(|_| json!({})),
            }));
        }
    }

    // Anthropic rejects a message with an empty content array; a turn whose only content
    // was blank/whitespace text (and carried no tool calls) still needs one block on the
    // wire (spec.md §8, Testable Property 9).
    if blocks.is_empty() {
        blocks.push(json!({ "type": "text", "text": " " }));
    }

    json!({ "role": role, "content": blocks })
}

fn render_tool_result_block(message: &Message) -> JsonValue {
    json!({
        "type": "tool_result",
        "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
        "content": render_content(&message.content),
    })
}

fn render_content(content: &Content) -> Vec<JsonValue> {
    let mut blocks: Vec<JsonValue> = Vec::new();
    for item in content.without_blank_text().iter() {
        match item {
            ContentItem::Text { text } => blocks.push(json!({ "type": "text", "text": text })),
            ContentItem::ImageUrl { url, mime } => {
                blocks.push(render_image_block(url, mime.as_deref()));
            }
            ContentItem::Json { value } => {
                blocks.push(json!({ "type": "text", "text": value.to_string() }));
            }
            ContentItem::Thought(thought) => {
                if let Some(encrypted) = &thought.encrypted {
                    blocks.push(json!({
                        "type": "redacted_thinking",
                        "data": BASE64_STANDARD.encode(encrypted),
                    }));
                } else {
                    blocks.push(json!({
                        "type": "thinking",
                        "thinking": thought.text.clone().unwrap_or_default(),
                        "signature": thought.signature.clone().unwrap_or_default(),
                    }));
                }
            }
            ContentItem::CacheHint { duration } => {
                if let Some(last) = blocks.last_mut() {
                    attach_cache_control(last, *duration);
                }
            }
        }
    }
    blocks
}

fn attach_cache_control(block: &mut JsonValue, duration: CacheDuration) {
    let ttl = match duration {
        CacheDuration::Short => "5m",
        CacheDuration::Long => "1h",
    };
    if let Some(obj) = block.as_object_mut() {
        obj.insert("cache_control".to_string(), json!({ "type": "ephemeral", "ttl": ttl }));
    }
}

fn render_image_block(url: &str, mime: Option<&str>) -> JsonValue {
    if let Some(data) = url.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        let (mime_from_uri, payload) = data;
        json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": mime.unwrap_or(mime_from_uri),
                "data": payload,
            },
        })
    } else {
        json!({
            "type": "image",
            "source": { "type": "url", "url": url },
        })
    }
}
