//! Hybrid context manager: rolling summary plus a verbatim recent window

use std::sync::Arc;

use threadline_runtime::{ChatMessage, CompletionRequest, CompletionService, Usage};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{ConversationState, Turn};
use crate::error::{ContextError, ContextResult};
use crate::strategy::{render_transcript, SUMMARY_INSTRUCTION};
use crate::window::WindowConfig;

/// Owns one conversation session.
///
/// Every call that reads and then mutates the history holds the state lock
/// for its whole duration, including the awaits on the completion service,
/// so calls on one manager are serialized. Separate managers share nothing.
pub struct ConversationContextManager {
    session_id: Uuid,
    config: WindowConfig,
    service: Arc<dyn CompletionService>,
    state: Mutex<ConversationState>,
}

impl std::fmt::Debug for ConversationContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationContextManager")
            .field("session_id", &self.session_id)
            .field("config", &self.config)
            .field("service", &self.service.name())
            .finish_non_exhaustive()
    }
}

impl ConversationContextManager {
    pub fn new(config: WindowConfig, service: Arc<dyn CompletionService>) -> ContextResult<Self> {
        config.validate()?;

        let session_id = Uuid::new_v4();
        debug!(
            %session_id,
            service = service.name(),
            recent_window_size = config.recent_window_size,
            compression_threshold = config.compression_threshold,
            "conversation session created"
        );

        Ok(Self {
            session_id,
            state: Mutex::new(ConversationState::new(config.system_instruction.clone())),
            config,
            service,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Messages that would be sent for `new_message` right now. Does not call
    /// the service.
    pub async fn build_context(&self, new_message: &str) -> ContextResult<Vec<ChatMessage>> {
        self.state.lock().await.build_context(new_message)
    }

    /// Send `new_message`, record the exchange and return the reply.
    ///
    /// If the completion fails the history is untouched. If the completion
    /// succeeds but the follow-up compression fails, the turn stays recorded
    /// and [`ContextError::Compression`] is returned.
    pub async fn chat(&self, new_message: &str) -> ContextResult<(String, Usage)> {
        self.chat_inner(new_message, None).await
    }

    /// Like [`chat`](Self::chat), but gives up with [`ContextError::Cancelled`]
    /// if `cancel` fires before the completion returns. A cancelled call
    /// leaves the history untouched.
    pub async fn chat_with_cancellation(
        &self,
        new_message: &str,
        cancel: &CancellationToken,
    ) -> ContextResult<(String, Usage)> {
        self.chat_inner(new_message, Some(cancel)).await
    }

    /// Record a finished exchange, compressing if the recent window overflows.
    pub async fn add_turn(
        &self,
        user_message: impl Into<String>,
        assistant_message: impl Into<String>,
    ) -> ContextResult<()> {
        let mut state = self.state.lock().await;
        self.record_turn(&mut state, Turn::new(user_message, assistant_message))
            .await
    }

    /// Turns recorded over the session's lifetime.
    ///
    /// Like every accessor, this waits for the state lock, so it blocks until
    /// an in-flight `chat` or `add_turn` (network call included) finishes.
    pub async fn total_turn_count(&self) -> u64 {
        self.state.lock().await.total_turn_count()
    }

    pub async fn has_summary(&self) -> bool {
        self.state.lock().await.summary().is_some()
    }

    pub async fn recent_turn_count(&self) -> usize {
        self.state.lock().await.recent_turns().len()
    }

    /// A copy of the current history.
    pub async fn snapshot(&self) -> ConversationState {
        self.state.lock().await.clone()
    }

    async fn chat_inner(
        &self,
        new_message: &str,
        cancel: Option<&CancellationToken>,
    ) -> ContextResult<(String, Usage)> {
        let mut state = self.state.lock().await;
        let messages = state.build_context(new_message)?;

        let request = CompletionRequest::new(messages)
            .with_system_instruction(state.system_instruction())
            .with_config(self.config.generation);

        let pending = self.service.complete(request);
        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(session_id = %self.session_id, "chat cancelled before completion returned");
                    return Err(ContextError::Cancelled);
                }
                result = pending => result,
            },
            None => pending.await,
        };

        let completion = result.map_err(|err| {
            warn!(session_id = %self.session_id, error = %err, "completion failed");
            ContextError::Completion(err)
        })?;

        let reply = completion.text.trim().to_string();
        self.record_turn(&mut state, Turn::new(new_message, reply.clone()))
            .await?;

        Ok((reply, completion.usage))
    }

    async fn record_turn(&self, state: &mut ConversationState, turn: Turn) -> ContextResult<()> {
        state.push_turn(turn);
        debug!(
            session_id = %self.session_id,
            total_turns = state.total_turn_count(),
            recent_turns = state.recent_turns().len(),
            "turn recorded"
        );

        if state.recent_turns().len() > self.config.compression_threshold {
            self.compress(state).await?;
        }
        Ok(())
    }

    /// Fold everything older than the recent window into a new summary.
    ///
    /// The summary and the turn list change together, and only after the
    /// summarization call succeeds.
    async fn compress(&self, state: &mut ConversationState) -> ContextResult<()> {
        let keep = self.config.recent_window_size;
        let folded = state.recent_turns().len() - keep;
        let transcript = render_transcript(state.summary(), &state.recent_turns()[..folded]);

        info!(
            session_id = %self.session_id,
            folded,
            kept = keep,
            "compressing conversation history"
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(transcript)])
            .with_system_instruction(SUMMARY_INSTRUCTION)
            .with_config(self.config.summary_generation);

        let completion = self.service.complete(request).await.map_err(|err| {
            warn!(
                session_id = %self.session_id,
                error = %err,
                pending_turns = state.recent_turns().len(),
                "summarization failed; history left uncompressed"
            );
            ContextError::Compression(err)
        })?;

        state.apply_compression(completion.text.trim().to_string(), folded);
        assert_eq!(
            state.recent_turns().len(),
            keep,
            "compression must leave exactly the recent window"
        );

        debug!(
            session_id = %self.session_id,
            summary_chars = state.summary().map_or(0, str::len),
            "summary replaced"
        );
        Ok(())
    }
}
