//! Completion service implementations
//!
//! Concrete implementations of the CompletionService trait for hosted
//! model APIs.

pub mod gemini;

pub use gemini::GeminiProvider;
