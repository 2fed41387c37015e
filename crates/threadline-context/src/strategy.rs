//! Standalone context-reduction strategies
//!
//! Truncation, a token-budget sliding window and one-shot summarization.
//! The hybrid manager uses the transcript format and summarization
//! instruction defined here.

use threadline_runtime::{
    ChatMessage, CompletionRequest, CompletionService, GenerationConfig, ServiceError,
};
use tracing::debug;

use crate::context::Turn;

/// Instruction sent with every hybrid-manager compression call.
pub const SUMMARY_INSTRUCTION: &str = "Summarize this conversation in 2-3 sentences. \
     Capture the key topics, facts, and decisions. Be concise.";

/// Instruction sent by [`summarize_turns`].
pub const ONE_SHOT_SUMMARY_INSTRUCTION: &str = "Summarize this conversation in 2-3 sentences. \
     Focus on: what topics were covered, key facts established, \
     and any decisions made. Be concise.";

const ONE_SHOT_ACKNOWLEDGMENT: &str = "Understood. I have context from our previous discussion.";

/// Rough token estimate: about four characters per token for English text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Flatten turns into a `User:`/`Assistant:` transcript, prefixed with the
/// previous summary when there is one.
pub fn render_transcript(previous_summary: Option<&str>, turns: &[Turn]) -> String {
    let mut transcript = String::new();
    if let Some(summary) = previous_summary {
        transcript.push_str(&format!("Previous summary: {summary}\n\n"));
    }
    for turn in turns {
        transcript.push_str(&format!("User: {}\n", turn.user_message()));
        transcript.push_str(&format!("Assistant: {}\n", turn.assistant_message()));
    }
    transcript
}

/// Keep only the last `max_turns` turns. Whole turns are dropped, never half a pair.
pub fn truncate_turns(turns: &[Turn], max_turns: usize) -> &[Turn] {
    let start = turns.len().saturating_sub(max_turns);
    if start > 0 {
        debug!(dropped = start, kept = turns.len() - start, "truncating oldest turns");
    }
    &turns[start..]
}

/// Result of [`sliding_window_by_tokens`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWindow<'a> {
    /// Kept turns, oldest first
    pub turns: &'a [Turn],
    /// Estimate including the system instruction
    pub estimated_tokens: usize,
}

/// Keep as many of the newest turns as fit in `max_total_tokens`.
///
/// The system instruction is always counted. Walks from newest to oldest and
/// stops at the first turn that would overflow the budget.
pub fn sliding_window_by_tokens<'a>(
    turns: &'a [Turn],
    system_instruction: &str,
    max_total_tokens: usize,
) -> TokenWindow<'a> {
    let mut running = estimate_tokens(system_instruction);
    let mut start = turns.len();

    for (index, turn) in turns.iter().enumerate().rev() {
        let cost = turn.estimate_tokens();
        if running + cost > max_total_tokens {
            break;
        }
        running += cost;
        start = index;
    }

    TokenWindow {
        turns: &turns[start..],
        estimated_tokens: running,
    }
}

/// Ask the service for a short summary of `turns`.
pub async fn summarize_turns(
    service: &dyn CompletionService,
    turns: &[Turn],
    config: GenerationConfig,
) -> Result<String, ServiceError> {
    let request = CompletionRequest::new(vec![ChatMessage::user(render_transcript(None, turns))])
        .with_system_instruction(ONE_SHOT_SUMMARY_INSTRUCTION)
        .with_config(config);

    let completion = service.complete(request).await?;
    Ok(completion.text.trim().to_string())
}

/// A summary pair followed by the recent turns, ready for a new user message.
pub fn summarized_context(summary: &str, recent: &[Turn]) -> Vec<ChatMessage> {
    let mut context = vec![
        ChatMessage::user(format!("[Previous conversation summary: {summary}]")),
        ChatMessage::assistant(ONE_SHOT_ACKNOWLEDGMENT),
    ];
    context.extend(recent.iter().flat_map(Turn::to_messages));
    context
}

#[cfg(test)]
mod tests {
    use threadline_runtime::{Completion, MockService};

    use super::*;

    fn turns(count: usize) -> Vec<Turn> {
        (0..count)
            .map(|n| Turn::new(format!("q{n}"), format!("a{n}")))
            .collect()
    }

    #[test]
    fn estimate_is_chars_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("ééééééé\u{e9}"), 2);
    }

    #[test]
    fn transcript_lists_turns_in_order() {
        let transcript = render_transcript(None, &turns(2));
        assert_eq!(transcript, "User: q0\nAssistant: a0\nUser: q1\nAssistant: a1\n");
    }

    #[test]
    fn transcript_prefixes_previous_summary() {
        let transcript = render_transcript(Some("earlier"), &turns(1));
        assert_eq!(transcript, "Previous summary: earlier\n\nUser: q0\nAssistant: a0\n");
    }

    #[test]
    fn truncate_keeps_newest_turns() {
        let all = turns(8);
        let kept = truncate_turns(&all, 3);
        assert_eq!(kept, &all[5..]);
        assert_eq!(truncate_turns(&all, 20).len(), 8);
        assert!(truncate_turns(&all, 0).is_empty());
    }

    #[test]
    fn sliding_window_stops_at_budget() {
        // Each turn: 8 + 8 chars -> 4 tokens. System: 8 chars -> 2 tokens.
        let all: Vec<Turn> = (0..5)
            .map(|n| Turn::new(format!("user-{n:03}"), format!("asst-{n:03}")))
            .collect();

        let window = sliding_window_by_tokens(&all, "sys-inst", 11);

        assert_eq!(window.turns, &all[3..]);
        assert_eq!(window.estimated_tokens, 10);
    }

    #[test]
    fn sliding_window_can_keep_nothing() {
        let all = turns(3);
        let window = sliding_window_by_tokens(&all, "a very long system instruction", 2);
        assert!(window.turns.is_empty());
        assert_eq!(window.estimated_tokens, 7);
    }

    #[test]
    fn sliding_window_does_not_skip_past_a_large_turn() {
        let all = vec![
            Turn::new("tiny", "tiny"),
            Turn::new("x".repeat(400), "y".repeat(400)),
            Turn::new("tiny", "tiny"),
        ];
        let window = sliding_window_by_tokens(&all, "", 50);
        assert_eq!(window.turns, &all[2..]);
    }

    #[tokio::test]
    async fn summarize_turns_sends_transcript_with_instruction() {
        let service = MockService::new();
        service.enqueue(Ok(Completion::stop("  Talked about q0 and q1.\n")));

        let summary = summarize_turns(&service, &turns(2), GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(summary, "Talked about q0 and q1.");
        let requests = service.requests();
        let request = &requests[0];
        assert_eq!(
            request.system_instruction.as_deref(),
            Some(ONE_SHOT_SUMMARY_INSTRUCTION)
        );
        assert!(ONE_SHOT_SUMMARY_INSTRUCTION.contains("Focus on: what topics were covered"));
        assert_ne!(ONE_SHOT_SUMMARY_INSTRUCTION, SUMMARY_INSTRUCTION);
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages[0].content.starts_with("User: q0\n"));
    }

    #[tokio::test]
    async fn summarize_turns_propagates_service_errors() {
        let service = MockService::new();
        service.enqueue(Err(ServiceError::Transport("connection reset".to_string())));

        let err = summarize_turns(&service, &turns(1), GenerationConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err, ServiceError::Transport("connection reset".to_string()));
    }

    #[test]
    fn summarized_context_leads_with_summary_pair() {
        let context = summarized_context("covered basics", &turns(2));
        assert_eq!(context.len(), 6);
        assert_eq!(
            context[0],
            ChatMessage::user("[Previous conversation summary: covered basics]")
        );
        assert_eq!(context[1], ChatMessage::assistant(ONE_SHOT_ACKNOWLEDGMENT));
        assert_eq!(context[5], ChatMessage::assistant("a1"));
    }
}
