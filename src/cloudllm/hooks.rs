//! Before-response hook and raw-event debugging sink (spec.md §4.6, §4.7).

use crate::cloudllm::message::Message;
use crate::cloudllm::provider::StreamStatus;
use async_trait::async_trait;

/// A caller-supplied view over the outbound transcript for one turn, offered a chance to
/// adjust it immediately before the provider request is assembled (spec.md §4.7).
///
/// `Turn()` reports which turn number is about to run (1-based); `Messages()` is a mutable
/// view over the transcript so far. A hook that wants to leave the turn untouched should
/// return [`HookAction::Unchanged`].
pub struct BeforeResponseView<'a> {
    turn: u32,
    messages: &'a mut Vec<Message>,
}

impl<'a> BeforeResponseView<'a> {
    pub fn new(turn: u32, messages: &'a mut Vec<Message>) -> Self {
        BeforeResponseView { turn, messages }
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn messages(&self) -> &[Message] {
        self.messages
    }

    pub fn messages_mut(&mut self) -> &mut Vec<Message> {
        self.messages
    }
}

/// What a [`BeforeResponseHook`] wants to do to the outbound transcript.
pub enum HookAction {
    /// Leave the transcript as-is.
    Unchanged,
    /// Insert `messages` before the existing transcript.
    Prepend(Vec<Message>),
    /// Insert `messages` after the existing transcript.
    Append(Vec<Message>),
    /// Discard the existing transcript and use `messages` instead.
    Replace(Vec<Message>),
    /// Abort the turn entirely; surfaced to the caller as
    /// [`crate::error::RuntimeError::BeforeResponseAborted`].
    Abort(String),
}

/// Runs immediately before each turn's request is assembled, letting a caller inject
/// system reminders, trim history, or abort the turn outright.
#[async_trait]
pub trait BeforeResponseHook: Send + Sync {
    async fn before_response(&self, view: BeforeResponseView<'_>) -> HookAction;
}

/// Applies `action` to `messages` in place. Pulled out of the orchestrator so the
/// Prepend/Append/Replace semantics have a single, independently testable home.
pub fn apply_hook_action(messages: &mut Vec<Message>, action: HookAction) -> Result<(), String> {
    match action {
        HookAction::Unchanged => {}
        HookAction::Prepend(mut extra) => {
            extra.append(messages);
            *messages = extra;
        }
        HookAction::Append(mut extra) => {
            messages.append(&mut extra);
        }
        HookAction::Replace(replacement) => {
            *messages = replacement;
        }
        HookAction::Abort(reason) => return Err(reason),
    }
    Ok(())
}

/// An optional sink for raw provider events, for callers building a trace/debug view of a
/// turn (spec.md §4.6). Distinct from [`crate::update::Update`]: a `Debugger` sees the
/// provider-level [`StreamStatus`] events before they're folded into transcript state.
pub trait Debugger: Send + Sync {
    fn on_event(&self, event: &StreamStatus);
}

/// A [`Debugger`] that logs every event at `trace` level, matching the teacher's
/// `log::log_enabled!` guard-before-format style (see `agent.rs`).
pub struct LoggingDebugger;

impl Debugger for LoggingDebugger {
    fn on_event(&self, event: &StreamStatus) {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("provider event: {event:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::message::Message;

    #[test]
    fn prepend_inserts_before_existing_messages() {
        let mut messages = vec![Message::user("original")];
        apply_hook_action(&mut messages, HookAction::Prepend(vec![Message::system("reminder")])).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content.to_string(), "reminder");
    }

    #[test]
    fn append_inserts_after_existing_messages() {
        let mut messages = vec![Message::user("original")];
        apply_hook_action(&mut messages, HookAction::Append(vec![Message::system("trailer")])).unwrap();
        assert_eq!(messages[1].content.to_string(), "trailer");
    }

    #[test]
    fn replace_discards_existing_messages() {
        let mut messages = vec![Message::user("original")];
        apply_hook_action(&mut messages, HookAction::Replace(vec![Message::user("fresh")])).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.to_string(), "fresh");
    }

    #[test]
    fn abort_returns_err_and_leaves_messages_untouched() {
        let mut messages = vec![Message::user("original")];
        let result = apply_hook_action(&mut messages, HookAction::Abort("stop".to_string()));
        assert_eq!(result, Err("stop".to_string()));
        assert_eq!(messages.len(), 1);
    }
}
