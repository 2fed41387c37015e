//! Gemini API Provider
//!
//! Implements the CompletionService trait for the `generateContent` endpoint,
//! with system instruction, multi-turn contents and usage metadata.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::{
    ChatMessage, Completion, CompletionRequest, CompletionService, FinishReason, Role,
    ServiceError, Usage,
};

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| ServiceError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self { client, config })
    }

    /// Create a provider from `GEMINI_*` environment variables.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::new(ProviderConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn generate_endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_key
        )
    }

    fn payload(req: CompletionRequest) -> GeminiGenerateRequest {
        GeminiGenerateRequest {
            system_instruction: req.system_instruction.map(|text| GeminiInstruction {
                parts: vec![GeminiPart { text }],
            }),
            contents: req.messages.into_iter().map(GeminiContent::from).collect(),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: req.config.max_output_tokens,
                temperature: req.config.temperature,
            },
        }
    }

    async fn parse_error_response(
        status: StatusCode,
        response: reqwest::Response,
    ) -> ServiceError {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());

        let parsed = serde_json::from_str::<GeminiErrorEnvelope>(&body)
            .ok()
            .map_or_else(|| body.clone(), |err| err.error.message);

        ServiceError::HttpStatus {
            status: status.as_u16(),
            body: parsed,
        }
    }
}

#[async_trait]
impl CompletionService for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<Completion, ServiceError> {
        debug!(
            model = %self.config.model,
            messages = req.messages.len(),
            "sending generateContent request"
        );
        let payload = Self::payload(req);

        let response = self
            .client
            .post(self.generate_endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|err| ServiceError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::parse_error_response(status, response).await);
        }

        let body: GeminiGenerateResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Decode(err.to_string()))?;

        let first_candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Decode("missing candidate in response".to_string()))?;

        let text = first_candidate
            .content
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = body.usage_metadata.map(Usage::from).unwrap_or_default();
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cached_tokens = usage.cached_tokens,
            "generateContent finished"
        );

        Ok(Completion {
            text,
            finish_reason: FinishReason::from_raw(first_candidate.finish_reason.as_deref()),
            usage,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction>,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

impl From<ChatMessage> for GeminiContent {
    fn from(message: ChatMessage) -> Self {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        Self {
            role,
            parts: vec![GeminiPart {
                text: message.content,
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiCandidateContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
    #[serde(default)]
    cached_content_token_count: u32,
}

impl From<GeminiUsageMetadata> for Usage {
    fn from(meta: GeminiUsageMetadata) -> Self {
        Self {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
            cached_tokens: meta.cached_content_token_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}
