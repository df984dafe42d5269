//! Typed error taxonomy surfaced at the session boundary (spec.md §7).

use std::error::Error;
use std::fmt;

/// Errors that can terminate a chat turn loop.
///
/// Validation failures and tool-execution errors are *not* represented here: per spec.md
/// §7's propagation policy, those become [`crate::toolbox::ToolOutcome::Error`] values and
/// the turn continues. `RuntimeError` is reserved for failures that stop the loop and close
/// the update sink.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// The caller's context/cancellation token was already cancelled.
    ContextCancelled,
    /// A deadline set by the caller elapsed mid-turn.
    DeadlineExceeded,
    /// The provider responded with a non-2xx HTTP status.
    HttpError {
        status_code: u16,
        status: String,
        error_type: Option<String>,
        message: Option<String>,
    },
    /// The provider signalled an error mid-stream (an `error` SSE event).
    ProviderError { kind: String, message: String },
    /// The underlying transport failed while reading the stream.
    StreamReadError { cause: String },
    /// The stream violated the expected protocol shape.
    ProtocolError { detail: String },
    /// A `tool_call_begin` event arrived without an id.
    MissingToolCallId { tool_name: String },
    /// The model requested a tool that is not registered in the active toolbox.
    ToolNotFound { tool_name: String },
    /// `max_turns` was reached before the model stopped calling tools.
    MaxTurnsReached,
    /// Both a JSON output schema and a non-empty toolbox were supplied for the same turn.
    ToolsAndJsonConflict,
    /// The before-response hook returned an error.
    BeforeResponseAborted { cause: String },
    /// A tool with a non-JSON grammar was offered to a provider that can't accept it.
    UnsupportedGrammar { provider: String, grammar: String },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::ContextCancelled => write!(f, "context cancelled"),
            RuntimeError::DeadlineExceeded => write!(f, "deadline exceeded"),
            RuntimeError::HttpError {
                status_code,
                status,
                error_type,
                message,
            } => {
                write!(f, "http error {status_code} ({status})")?;
                if let Some(t) = error_type {
                    write!(f, " [{t}]")?;
                }
                if let Some(m) = message {
                    write!(f, ": {m}")?;
                }
                Ok(())
            }
            RuntimeError::ProviderError { kind, message } => {
                write!(f, "provider error [{kind}]: {message}")
            }
            RuntimeError::StreamReadError { cause } => write!(f, "stream read error: {cause}"),
            RuntimeError::ProtocolError { detail } => write!(f, "protocol error: {detail}"),
            RuntimeError::MissingToolCallId { tool_name } => {
                write!(f, "missing tool call ID for tool \"{tool_name}\"")
            }
            RuntimeError::ToolNotFound { tool_name } => {
                write!(f, "tool \"{tool_name}\" not found")
            }
            RuntimeError::MaxTurnsReached => write!(f, "maximum turns reached"),
            RuntimeError::ToolsAndJsonConflict => {
                write!(f, "a non-empty toolbox and a JSON output schema cannot both be set")
            }
            RuntimeError::BeforeResponseAborted { cause } => {
                write!(f, "before-response hook aborted the turn: {cause}")
            }
            RuntimeError::UnsupportedGrammar { provider, grammar } => write!(
                f,
                "provider \"{provider}\" does not support the \"{grammar}\" tool grammar"
            ),
        }
    }
}

impl Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
