//! Threadline Context Management - rolling summary plus recent-turn window
//!
//! This crate provides:
//! - The hybrid conversation manager (summary of old turns + verbatim recent turns)
//! - Window configuration and validation
//! - Standalone truncation, token-budget and one-shot summarization strategies

pub mod context;
pub mod error;
pub mod manager;
pub mod strategy;
pub mod window;

pub use context::{ConversationState, Phase, Turn};
pub use error::{ContextError, ContextResult};
pub use manager::ConversationContextManager;
pub use window::WindowConfig;

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::{ConversationState, Phase, Turn};
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::manager::ConversationContextManager;
    pub use crate::strategy::{
        estimate_tokens, sliding_window_by_tokens, summarize_turns, summarized_context,
        truncate_turns, TokenWindow, ONE_SHOT_SUMMARY_INSTRUCTION, SUMMARY_INSTRUCTION,
    };
    pub use crate::window::WindowConfig;
}
