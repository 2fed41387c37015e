use std::sync::Arc;

use httpmock::prelude::*;
use threadline_context::{ContextError, ConversationContextManager, Phase, WindowConfig};
use threadline_runtime::{GeminiProvider, ProviderConfig, ServiceError};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn provider(server: &MockServer) -> Arc<GeminiProvider> {
    Arc::new(
        GeminiProvider::new(
            ProviderConfig::new("test-key")
                .with_base_url(server.base_url())
                .with_model("gemini-2.0-flash"),
        )
        .expect("provider should build"),
    )
}

#[tokio::test]
async fn chat_over_gemini_compresses_after_threshold() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GENERATE_PATH)
                .query_param("key", "test-key")
                .body_includes("You are a helpful Python tutor.");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "Here is a short answer."}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {
                        "promptTokenCount": 20,
                        "candidatesTokenCount": 6,
                        "totalTokenCount": 26
                    }
                }));
        })
        .await;
    let summary_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GENERATE_PATH)
                .body_includes("Summarize this conversation")
                .body_includes("User: What is a variable?")
                .body_includes("User: What is a list?");
            then.status(200).json_body(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "We covered variables and lists."}]},
                    "finishReason": "STOP"
                }]
            }));
        })
        .await;

    let manager = ConversationContextManager::new(
        WindowConfig::new("You are a helpful Python tutor.", 1, 2),
        provider(&server),
    )
    .expect("config is valid");

    for question in ["What is a variable?", "What is a list?", "What is a dictionary?"] {
        let (reply, usage) = manager.chat(question).await.expect("chat should succeed");
        assert_eq!(reply, "Here is a short answer.");
        assert_eq!(usage.total_tokens, 26);
    }

    summary_mock.assert_async().await;

    let state = manager.snapshot().await;
    assert_eq!(state.phase(), Phase::Compressed);
    assert_eq!(state.summary(), Some("We covered variables and lists."));
    assert_eq!(state.recent_turns().len(), 1);
    assert_eq!(state.recent_turns()[0].user_message(), "What is a dictionary?");
    assert_eq!(state.total_turn_count(), 3);
}

#[tokio::test]
async fn provider_rejection_surfaces_without_recording_a_turn() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(413).json_body(serde_json::json!({
                "error": {"code": 413, "message": "payload too large", "status": "INVALID_ARGUMENT"}
            }));
        })
        .await;

    let manager = ConversationContextManager::new(
        WindowConfig::new("You are a helpful Python tutor.", 2, 4),
        provider(&server),
    )
    .expect("config is valid");

    let err = manager.chat("hello").await.unwrap_err();

    assert_eq!(
        err,
        ContextError::Completion(ServiceError::HttpStatus {
            status: 413,
            body: "payload too large".to_string(),
        })
    );
    assert_eq!(manager.total_turn_count().await, 0);
    assert!(!manager.has_summary().await);
}

#[tokio::test]
#[ignore = "calls the live Gemini API; requires GEMINI_API_KEY"]
async fn live_conversation_recalls_summarized_context() {
    let provider = Arc::new(GeminiProvider::from_env().expect("GEMINI_API_KEY must be set"));
    let manager = ConversationContextManager::new(
        WindowConfig::new(
            "You are a helpful Python tutor. Keep answers to 1-2 sentences.",
            3,
            5,
        ),
        provider,
    )
    .expect("config is valid");

    for question in [
        "What is a variable?",
        "What is a list?",
        "What is a dictionary?",
        "How do I write a for loop?",
        "What is a function?",
        "What about lambda functions?",
    ] {
        manager.chat(question).await.expect("chat should succeed");
    }

    assert!(manager.has_summary().await);
    assert_eq!(manager.recent_turn_count().await, 3);

    let (answer, _) = manager
        .chat("Remind me what we said about variables at the start.")
        .await
        .expect("chat should succeed");
    println!("Recall answer: {answer}");
}
