//! Tool registration and dispatch (spec.md §3, §4.3).
//!
//! Generalizes the teacher's single-trait `tools/*` modules (see `tools/calculator.rs`)
//! into a registry that can be handed straight to a [`Provider`](crate::provider::Provider)
//! as a set of [`FunctionSchema`]s and that the orchestrator can dispatch model-issued
//! [`ToolCall`]s against.

use crate::cloudllm::message::ToolCall;
use crate::cloudllm::schema::{FunctionSchema, ValueSchema};
use crate::cloudllm::update::{ToolResult, ToolStatus};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A channel a running tool uses to report progress before it finishes, surfaced to the
/// caller as [`crate::update::Update::ToolStatus`] (spec.md §4.3, "long-running tools may
/// report status").
#[derive(Clone)]
pub struct ToolContext {
    call_id: String,
    status_tx: mpsc::UnboundedSender<(String, ToolStatus)>,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, status_tx: mpsc::UnboundedSender<(String, ToolStatus)>) -> Self {
        ToolContext {
            call_id: call_id.into(),
            status_tx,
        }
    }

    /// Report progress. Silently dropped if the caller is no longer listening (the turn
    /// may have already been cancelled).
    pub fn report_status(&self, label: impl Into<String>, detail: Option<String>) {
        let _ = self.status_tx.send((
            self.call_id.clone(),
            ToolStatus {
                label: label.into(),
                detail,
            },
        ));
    }
}

/// A callable the model can invoke, identified by name within a [`Toolbox`].
///
/// Implementors validate their own arguments against [`Tool::schema`] if they need
/// stricter checks than the generic [`crate::schema::validate`] the orchestrator already
/// runs before dispatch.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model sees; must be unique within the toolbox it's registered in.
    fn name(&self) -> &str;

    /// The schema describing this tool's name, description, and argument shape.
    fn schema(&self) -> FunctionSchema;

    /// Execute the tool against already-validated `arguments`.
    async fn call(&self, arguments: JsonValue, context: ToolContext) -> ToolResult;
}

/// Which tools a provider is permitted to call for a single turn (spec.md §3, §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// The model may call any registered tool, or none.
    Any,
    /// The model may only call tools from this subset; an empty subset disallows tool use
    /// entirely (the request assembler still sends the full tool list for cacheability,
    /// with `tool_choice` forced to "none").
    AllowOnly(Vec<String>),
    /// The model must call one of these tools this turn. A singleton forces that specific
    /// tool natively; an empty subset disallows tool use, same as `AllowOnly(∅)`.
    RequireOneOf(Vec<String>),
}

impl Default for Choice {
    fn default() -> Self {
        Choice::Any
    }
}

/// An insertion-ordered registry of [`Tool`]s offered to the model for a turn.
///
/// Order matters: it determines the order tools appear in the assembled request, which
/// some providers use as a tie-breaker hint. A `HashMap` would reshuffle that order on
/// every run.
#[derive(Clone, Default)]
pub struct Toolbox {
    order: Vec<String>,
    tools: BTreeMap<String, Arc<dyn Tool>>,
    pub choice: Choice,
}

impl Toolbox {
    pub fn new() -> Self {
        Toolbox {
            order: Vec::new(),
            tools: BTreeMap::new(),
            choice: Choice::Any,
        }
    }

    /// Register a tool, replacing any earlier tool registered under the same name while
    /// keeping its original position in iteration order.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choice = choice;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Tool schemas in registration order, as handed to the request assembler.
    pub fn schemas(&self) -> Vec<FunctionSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| t.schema()))
            .collect()
    }

    /// Reject a `Choice::AllowOnly`/`RequireOneOf` whose named subset has no overlap at
    /// all with this toolbox's registered tools (spec.md §4.5: "error if S disjoint from
    /// toolbox"). An empty subset is not an error — it means "disallow tool use" and is
    /// handled by the request assembler forcing `tool_choice: none`.
    pub fn validate_choice(&self) -> Result<(), String> {
        let disjoint = |names: &[String]| !names.is_empty() && names.iter().all(|n| !self.tools.contains_key(n));
        match &self.choice {
            Choice::Any => Ok(()),
            Choice::AllowOnly(names) if disjoint(names) => {
                Err(format!("AllowOnly subset {names:?} shares no tool with this toolbox"))
            }
            Choice::RequireOneOf(names) if disjoint(names) => {
                Err(format!("RequireOneOf subset {names:?} shares no tool with this toolbox"))
            }
            Choice::AllowOnly(_) | Choice::RequireOneOf(_) => Ok(()),
        }
    }
}

/// Runs a single [`ToolCall`] against a [`Toolbox`], validating arguments against the
/// tool's schema before dispatch (spec.md §4.3, §4.4).
pub struct Runner;

impl Runner {
    /// Resolve, validate, and execute `call`. Returns the outcome regardless of whether
    /// the tool itself signalled an error — only a missing tool or malformed arguments
    /// short-circuit before the tool ever runs, and even those are reported as a
    /// [`ToolResult::error`] rather than a [`crate::error::RuntimeError`], per spec.md §7's
    /// "tool failures don't stop the turn loop" rule. `tool_name` callers who need to
    /// distinguish "not found" should check [`Toolbox::get`] first; `Runner::run` folds
    /// that into the result to keep dispatch a single call site.
    pub async fn run(toolbox: &Toolbox, call: &ToolCall, context: ToolContext) -> ToolResult {
        let Some(tool) = toolbox.get(&call.name) else {
            return ToolResult::llm_misbehaved(format!("tool \"{}\" not found", call.name));
        };

        let arguments = match call.arguments_json() {
            Ok(value) => value,
            Err(e) => return ToolResult::llm_misbehaved(format!("malformed arguments: {e}")),
        };

        if let Err(violation) = crate::cloudllm::schema::validate(&tool.schema().parameters, &arguments) {
            return ToolResult::llm_misbehaved(format!("argument validation failed: {violation}"));
        }

        tool.call(arguments, context).await
    }
}

/// Adapts a bare async closure into a [`Tool`], for one-off tools that don't need their
/// own struct (spec.md §4.3's "external tools may register a single handler").
pub struct FnTool<F> {
    name: String,
    description: String,
    parameters: ValueSchema,
    handler: F,
}

impl<F> FnTool<F> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: ValueSchema, handler: F) -> Self {
        FnTool {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(JsonValue, ToolContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ToolResult> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new(self.name.clone(), self.description.clone(), self.parameters.clone())
    }

    async fn call(&self, arguments: JsonValue, context: ToolContext) -> ToolResult {
        (self.handler)(arguments, context).await
    }
}
