// src/lib.rs

// Import the top-level `cloudllm` module.
pub mod cloudllm;

// Re-export the types most callers reach for, so `cloudllm_runtime::Message` works without
// navigating the full module path.
pub use cloudllm::{ChatRequest, Choice, Message, Orchestrator, Provider, ResponseFormat, Role, RunOutcome, RunRequest, RuntimeConfig, RuntimeError, RuntimeResult, Tool, Toolbox, Update};
