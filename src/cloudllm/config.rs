//! Runtime configuration for a chat session (spec.md §4.1, §4.5).
//!
//! The teacher's own `config.rs` (since removed from this crate) deliberately has no file
//! parsing: callers construct a config in code and pass API keys in from their own
//! environment/secrets handling. We keep that philosophy here rather than introducing a
//! TOML/env-file layer the corpus doesn't otherwise use for this concern.

use std::time::Duration;

/// Per-session knobs that apply across every turn of an orchestrated conversation.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Hard cap on the number of turns (model response + tool dispatch cycles) a single
    /// `run` call will execute before returning
    /// [`crate::error::RuntimeError::MaxTurnsReached`] (spec.md §4.1).
    pub max_turns: u32,
    /// Default reasoning budget handed to providers that support extended thinking,
    /// unless a call overrides it.
    pub thinking_budget_tokens: Option<u32>,
    /// Overrides a provider's default base URL — for routing through a proxy or hitting a
    /// local mock server in tests.
    pub base_url_override: Option<String>,
    /// Timeout applied to the whole HTTP request/response handshake, not the streaming
    /// body itself (a slow-but-live stream should not time out here).
    pub connect_timeout: Duration,
    /// Max wall-clock time the whole turn loop may run before the orchestrator cancels
    /// and returns [`crate::error::RuntimeError::DeadlineExceeded`].
    pub turn_deadline: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_turns: 25,
            thinking_budget_tokens: None,
            base_url_override: None,
            connect_timeout: Duration::from_secs(10),
            turn_deadline: None,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_thinking_budget_tokens(mut self, tokens: u32) -> Self {
        self.thinking_budget_tokens = Some(tokens);
        self
    }

    pub fn with_base_url_override(mut self, url: impl Into<String>) -> Self {
        self.base_url_override = Some(url.into());
        self
    }

    pub fn with_turn_deadline(mut self, deadline: Duration) -> Self {
        self.turn_deadline = Some(deadline);
        self
    }
}
