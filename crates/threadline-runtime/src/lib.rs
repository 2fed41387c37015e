//! Runtime abstractions for hosted completion services.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod providers;

pub use config::ProviderConfig;
pub use providers::GeminiProvider;

/// Author of a message in the outgoing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Role-tagged text sent to a completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling knobs forwarded to the provider. `None` leaves the provider default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_instruction: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub config: GenerationConfig,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            system_instruction: None,
            messages,
            config: GenerationConfig::default(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Other(String),
}

impl FinishReason {
    /// Maps a provider's raw finish reason string.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("STOP" | "stop" | "end_turn") => Self::Stop,
            Some("MAX_TOKENS" | "length" | "max_tokens") => Self::MaxTokens,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other("UNSPECIFIED".to_string()),
        }
    }
}

/// Token accounting reported with a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Prompt tokens served from the provider's cache, 0 if none.
    pub cached_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl Completion {
    /// A completed reply with empty usage.
    pub fn stop(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("mock service has no queued response")]
    MockQueueEmpty,
    #[error("service error: {0}")]
    Message(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// A hosted model that turns a prompt into generated text plus usage metadata.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError>;
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<Completion, ServiceError> + Send + Sync>;

/// Scripted completion service for tests.
///
/// Queued results are returned first, in order. Once the queue is empty the
/// responder (if any) computes the result. Every request is recorded.
#[derive(Default)]
pub struct MockService {
    queue: Mutex<VecDeque<Result<Completion, ServiceError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl std::fmt::Debug for MockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockService")
            .field("queued", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .field("has_responder", &self.responder.is_some())
            .finish_non_exhaustive()
    }
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<Completion, ServiceError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    pub fn enqueue(&self, result: Result<Completion, ServiceError>) {
        self.queue
            .lock()
            .expect("mock queue poisoned")
            .push_back(result);
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("mock request log poisoned").len()
    }
}

#[async_trait]
impl CompletionService for MockService {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(request.clone());

        let queued = self.queue.lock().expect("mock queue poisoned").pop_front();
        match (queued, &self.responder) {
            (Some(result), _) => result,
            (None, Some(responder)) => responder(&request),
            (None, None) => Err(ServiceError::MockQueueEmpty),
        }
    }
}
