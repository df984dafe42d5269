//! The reference [`Provider`] implementation: Anthropic's Messages API.

pub mod request;
pub mod sse;
pub mod stream_machine;

use crate::cloudllm::error::{RuntimeError, RuntimeResult};
use crate::cloudllm::http_client::SHARED_HTTP_CLIENT;
use crate::cloudllm::provider::{ChatRequest, Provider, ProviderEventStream};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Talks to Anthropic's Messages API over SSE.
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        AnthropicProvider {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(&self, chat_request: ChatRequest) -> RuntimeResult<ProviderEventStream> {
        let body = request::build_request_body(&chat_request);

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("anthropic request: model={} tools={}", chat_request.model, chat_request.tools.len());
        }

        let response = SHARED_HTTP_CLIENT
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeError::HttpError {
                status_code: e.status().map(|s| s.as_u16()).unwrap_or(0),
                status: "request failed".to_string(),
                error_type: None,
                message: Some(e.to_string()),
            })?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let status = response.status().to_string();
            let body_text = response.text().await.unwrap_or_default();
            let (error_type, message) = parse_error_body(&body_text);
            log::error!("anthropic request failed: status={status_code} type={error_type:?} message={message:?}");
            return Err(RuntimeError::HttpError {
                status_code,
                status,
                error_type,
                message: message.or(Some(body_text)),
            });
        }

        Ok(stream_machine::decode_response(response))
    }
}

fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (None, None);
    };
    let error = value.get("error");
    let kind = error.and_then(|e| e.get("type")).and_then(|v| v.as_str()).map(str::to_string);
    let message = error.and_then(|e| e.get("message")).and_then(|v| v.as_str()).map(str::to_string);
    (kind, message)
}
