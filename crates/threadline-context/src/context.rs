//! Conversation state types

use serde::{Deserialize, Serialize};
use threadline_runtime::ChatMessage;

use crate::error::{ContextError, ContextResult};
use crate::strategy::estimate_tokens;

pub(crate) const SUMMARY_ACKNOWLEDGMENT: &str = "I recall our previous discussion. How can I help?";

/// One completed exchange: a user message and the assistant's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    user_message: String,
    assistant_message: String,
}

impl Turn {
    pub fn new(user_message: impl Into<String>, assistant_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            assistant_message: assistant_message.into(),
        }
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn assistant_message(&self) -> &str {
        &self.assistant_message
    }

    /// The turn as a user message followed by an assistant message.
    pub fn to_messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage::user(self.user_message.clone()),
            ChatMessage::assistant(self.assistant_message.clone()),
        ]
    }

    /// Rough token estimate for both sides of the exchange.
    pub fn estimate_tokens(&self) -> usize {
        estimate_tokens(&self.user_message) + estimate_tokens(&self.assistant_message)
    }
}

/// Whether any turns have been folded into a summary yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Fresh,
    Compressed,
}

/// Conversation history: a rolling summary plus the turns not yet folded into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    system_instruction: String,
    summary: Option<String>,
    recent_turns: Vec<Turn>,
    total_turn_count: u64,
}

impl ConversationState {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            summary: None,
            recent_turns: Vec::new(),
            total_turn_count: 0,
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn recent_turns(&self) -> &[Turn] {
        &self.recent_turns
    }

    pub fn total_turn_count(&self) -> u64 {
        self.total_turn_count
    }

    pub fn phase(&self) -> Phase {
        if self.summary.is_some() {
            Phase::Compressed
        } else {
            Phase::Fresh
        }
    }

    /// Assemble the outgoing messages for `new_message`.
    ///
    /// Order: the summary pair (when a summary exists), every recent turn as
    /// user then assistant, then the new user message. The system instruction
    /// is not included; it travels separately with the request.
    ///
    /// A message that is empty or only whitespace is rejected with
    /// [`ContextError::EmptyInput`].
    pub fn build_context(&self, new_message: &str) -> ContextResult<Vec<ChatMessage>> {
        if new_message.trim().is_empty() {
            return Err(ContextError::EmptyInput);
        }

        let mut context = Vec::with_capacity(self.recent_turns.len() * 2 + 3);

        if let Some(summary) = &self.summary {
            context.push(ChatMessage::user(format!(
                "[Conversation summary so far: {summary}]"
            )));
            context.push(ChatMessage::assistant(SUMMARY_ACKNOWLEDGMENT));
        }

        context.extend(self.recent_turns.iter().flat_map(Turn::to_messages));
        context.push(ChatMessage::user(new_message));

        Ok(context)
    }

    /// Rough token estimate of what the next request would carry, excluding
    /// the new message.
    pub fn estimated_tokens(&self) -> usize {
        let summary_tokens = self.summary.as_deref().map_or(0, |summary| {
            estimate_tokens(summary) + estimate_tokens(SUMMARY_ACKNOWLEDGMENT)
        });
        estimate_tokens(&self.system_instruction)
            + summary_tokens
            + self.recent_turns.iter().map(Turn::estimate_tokens).sum::<usize>()
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.recent_turns.push(turn);
        self.total_turn_count += 1;
    }

    /// Replace the summary and drop the folded prefix in one step.
    pub(crate) fn apply_compression(&mut self, summary: String, folded: usize) {
        self.summary = Some(summary);
        self.recent_turns.drain(..folded);
    }
}
