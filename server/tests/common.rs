//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_core::LlmClient;
use server::config::ServerConfig;
use server::metrics::RelayMetrics;
use server::pipeline::CONTINUE_PROMPT;
use server::{app, AppState};
use tts_core::SpeechClient;

pub const QUICK_TEXT: &str = "Let me check that for you.";
pub const FULL_TEXT: &str = "Here is the complete answer you asked for.";

/// State wired to a mock upstream standing in for both APIs.
pub fn test_state(upstream: &MockServer) -> (AppState, Arc<RelayMetrics>) {
    test_state_with_config(
        upstream,
        ServerConfig {
            api_base: upstream.uri(),
            ..ServerConfig::default()
        },
    )
}

pub fn test_state_with_config(
    upstream: &MockServer,
    config: ServerConfig,
) -> (AppState, Arc<RelayMetrics>) {
    let metrics = Arc::new(RelayMetrics::default());
    let state = AppState {
        llm: LlmClient::new("test-key", &config.llm_model).with_api_base(upstream.uri()),
        tts: SpeechClient::new("test-key", &config.tts_model, &config.tts_voice)
            .with_api_base(upstream.uri()),
        metrics: metrics.clone(),
        config,
    };
    (state, metrics)
}

/// Create a test app instance backed by `upstream`.
pub fn create_test_app(upstream: &MockServer) -> (Router, Arc<RelayMetrics>) {
    let (state, metrics) = test_state(upstream);
    (app(state), metrics)
}

pub fn chat_completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    })
}

/// SSE body for a streamed completion, one delta per fragment.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(fragment).unwrap()
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Mount mocks for the whole two-phase flow.
///
/// The full-completion mock matches on the continuation prompt and
/// outranks the catch-all quick mock.
pub async fn mount_two_phase_mocks(
    upstream: &MockServer,
    quick_payload: Vec<u8>,
    full_payload: Vec<u8>,
    quick_speech_delay: Duration,
    full_chat_delay: Duration,
) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(CONTINUE_PROMPT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_completion_body(FULL_TEXT))
                .set_delay(full_chat_delay),
        )
        .with_priority(1)
        .mount(upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(QUICK_TEXT)))
        .mount(upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_partial_json(serde_json::json!({ "input": QUICK_TEXT })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(quick_payload)
                .set_delay(quick_speech_delay),
        )
        .with_priority(1)
        .mount(upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_partial_json(serde_json::json!({ "input": FULL_TEXT })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(full_payload))
        .with_priority(1)
        .mount(upstream)
        .await;
}
