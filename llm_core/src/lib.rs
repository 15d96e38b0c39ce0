pub mod sentences;

use anyhow::{anyhow, Context, Result};
use async_stream::try_stream;
use futures::{stream::BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default upstream API base. Override with [`LlmClient::with_api_base`].
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Developer,
}

/// One turn of a conversation, built fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self { role: Role::Developer, content: content.into() }
    }
}

/// Request body for the chat completions endpoint
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// One server-sent chunk of a streamed completion.
#[derive(Deserialize)]
struct ChunkResponse {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

/// Async client for the chat completions API.
///
/// Cheap to clone; the underlying reqwest client pools connections.
/// The API key and model are injected by the caller, nothing is read
/// from the environment here.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Point the client at a different upstream, e.g. a mock server in tests.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whole-response chat completion.
    ///
    /// `instructions` is prepended as a developer message. Returns the
    /// first choice's content; upstream errors propagate without retry.
    pub async fn complete(
        &self,
        instructions: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<String> {
        let mut turn = Vec::with_capacity(messages.len() + 1);
        turn.push(ChatMessage::developer(instructions));
        turn.extend(messages);

        debug!(model = %self.model, turns = turn.len(), "requesting completion");
        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model: &self.model, messages: &turn, stream: false })
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("chat completion response was not valid JSON")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }

    /// Streamed chat completion.
    ///
    /// The request is sent before this returns, so auth/connect failures
    /// surface here rather than as the first stream item. The returned
    /// stream yields content deltas in arrival order and ends at the
    /// `[DONE]` marker or upstream EOF.
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<BoxStream<'static, Result<String>>> {
        debug!(model = %self.model, turns = messages.len(), "opening streamed completion");
        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model: &self.model, messages: &messages, stream: true })
            .send()
            .await
            .context("streaming completion request failed")?
            .error_for_status()
            .context("streaming completion returned an error status")?;

        Ok(delta_stream(response).boxed())
    }
}

enum SseEvent {
    Delta(String),
    Done,
    Ignored,
}

/// Parse one SSE line. Deltas with no content (role-only chunks,
/// keep-alives, comment lines) are ignored rather than forwarded.
fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Ignored);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseEvent::Ignored);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: ChunkResponse =
        serde_json::from_str(data).context("malformed completion chunk")?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);
    match content {
        Some(text) => Ok(SseEvent::Delta(text)),
        None => Ok(SseEvent::Ignored),
    }
}

/// Turn an SSE response body into a stream of content deltas.
///
/// Network chunks are not aligned to lines; bytes are buffered and only
/// complete lines are parsed. The response is owned by the stream and
/// closed when the stream is dropped.
fn delta_stream(response: reqwest::Response) -> impl Stream<Item = Result<String>> {
    try_stream! {
        let mut body = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.context("error reading completion stream")?;
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = std::str::from_utf8(&line[..line.len() - 1])
                    .context("completion stream was not valid UTF-8")?;
                match parse_sse_line(line)? {
                    SseEvent::Delta(text) => yield text,
                    SseEvent::Done => break 'read,
                    SseEvent::Ignored => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn parse_sse_line_extracts_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_sse_line(line).unwrap() {
            SseEvent::Delta(text) => assert_eq!(text, "Hi"),
            _ => panic!("expected a delta"),
        }
    }

    #[test]
    fn parse_sse_line_ignores_role_only_chunks() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_line(line).unwrap(), SseEvent::Ignored));
    }

    #[test]
    fn parse_sse_line_recognizes_done() {
        assert!(matches!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Done));
    }

    #[test]
    fn parse_sse_line_skips_non_data_lines() {
        assert!(matches!(parse_sse_line("").unwrap(), SseEvent::Ignored));
        assert!(matches!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Ignored));
    }

    #[test]
    fn parse_sse_line_rejects_malformed_json() {
        assert!(parse_sse_line("data: {not json}").is_err());
    }

    #[tokio::test]
    async fn complete_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Sure thing." } }]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new("test-key", "test-model").with_api_base(server.uri());
        let reply = client
            .complete("Be concise.", vec![ChatMessage::user("Hello?")])
            .await
            .unwrap();
        assert_eq!(reply, "Sure thing.");
    }

    #[tokio::test]
    async fn complete_propagates_upstream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = LlmClient::new("bad-key", "test-model").with_api_base(server.uri());
        let result = client.complete("", vec![ChatMessage::user("Hello?")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stream_chat_yields_deltas_in_order() {
        let server = MockServer::start().await;
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            chunk_line("Hel"),
            chunk_line("lo"),
            chunk_line(" there.")
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = LlmClient::new("test-key", "test-model").with_api_base(server.uri());
        let stream = client
            .stream_chat(vec![ChatMessage::user("Hello?")])
            .await
            .unwrap();
        let deltas: Vec<String> = stream.map(|d| d.unwrap()).collect().await;
        assert_eq!(deltas, vec!["Hel", "lo", " there."]);
    }

    #[tokio::test]
    async fn stream_chat_fails_before_streaming_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LlmClient::new("test-key", "test-model").with_api_base(server.uri());
        assert!(client.stream_chat(vec![ChatMessage::user("Hello?")]).await.is_err());
    }
}
