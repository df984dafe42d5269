//! Concrete [`crate::cloudllm::provider::Provider`] implementations.
//!
//! Only Anthropic ships as a reference implementation; Gemini/OpenAI wire support follows
//! the same `mod.rs` + `sse.rs` + `stream_machine.rs` + `request.rs` layout when added.

pub mod anthropic;
