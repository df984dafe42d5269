//! Built-in [`crate::cloudllm::toolbox::Tool`] implementations.
//!
//! Only `calculator` ships today; it's kept mainly as a worked example of wrapping a
//! plain evaluator in the `Tool` trait for a [`crate::cloudllm::toolbox::Toolbox`].

pub mod calculator;

pub use calculator::{Calculator, CalculatorError, CalculatorResult, CalculatorTool};
