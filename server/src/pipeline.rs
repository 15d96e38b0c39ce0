//! Two-phase response orchestration.
//!
//! The quick reply is generated first and spoken immediately; the full
//! reply is computed in a background task while the quick clip streams
//! out, then joined and spoken once the quick clip is exhausted. The
//! two phases never interleave at the byte level.

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use llm_core::{ChatMessage, LlmClient};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tts_core::SpeechClient;

use crate::error::ApiError;

/// Instructions for the quick filler reply.
pub const QUICK_INSTRUCTIONS: &str = "Be concise. Based on the user message, \
    generate a very short message (one sentence) which can be played to the \
    user while the long response is prepared. If you do not know the answer \
    right away, be creative and generate something interesting and engaging. \
    Stop after one sentence. Do not use any code, no markdown, no links, no \
    emojis.";

/// Instructions for the full reply that follows the quick one.
pub const FULL_INSTRUCTIONS: &str = "Continue the response generation without \
    repeating the previous message. Prepare an answer suitable for text to \
    speech conversion. No code, no markdown, plain human readable text.";

/// User turn that asks the model to pick up where the quick reply stopped.
pub const CONTINUE_PROMPT: &str = "continue...";

/// Background task handle, joined exactly once and aborted if abandoned
/// before the join.
pub struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }

    /// Await the task's result. Consumes the handle, so a task cannot be
    /// joined twice.
    pub async fn join(mut self) -> Result<T> {
        (&mut self.0)
            .await
            .map_err(|e| anyhow!("background task failed: {e}"))
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        // No-op if the task already completed.
        self.0.abort();
    }
}

/// Generate the short filler reply for `question`.
pub async fn quick_response(llm: &LlmClient, question: &str) -> Result<String> {
    llm.complete(QUICK_INSTRUCTIONS, vec![ChatMessage::user(question)])
        .await
}

/// Launch generation of the full reply as a background task.
///
/// The task is started here, before the quick clip is spoken; the
/// caller joins it after the quick audio is drained. Dropping the
/// returned handle aborts the request.
pub fn spawn_full_response(
    llm: &LlmClient,
    question: &str,
    quick: &str,
) -> AbortOnDrop<Result<String>> {
    let llm = llm.clone();
    let turn = vec![
        ChatMessage::user(question),
        ChatMessage::assistant(quick),
        ChatMessage::user(CONTINUE_PROMPT),
    ];
    info!("full response task started");
    AbortOnDrop::new(tokio::spawn(async move {
        llm.complete(FULL_INSTRUCTIONS, turn).await
    }))
}

/// Build the two-phase audio stream for `question`.
///
/// The quick completion and the opening of its synthesis request happen
/// before this returns, so upstream failures at that stage surface as a
/// clean [`ApiError`] with no audio emitted. Failures after the first
/// byte surface as a stream error; audio already delivered cannot be
/// retracted. Dropping the stream aborts the background task and closes
/// any open synthesis response.
pub async fn two_phase_audio(
    llm: LlmClient,
    tts: SpeechClient,
    question: String,
) -> Result<impl Stream<Item = Result<Bytes>>, ApiError> {
    let quick = quick_response(&llm, &question)
        .await
        .map_err(ApiError::Llm)?;
    debug!(chars = quick.len(), "quick response ready");

    // Launched before the quick clip starts draining so the two phases
    // overlap.
    let full_task = spawn_full_response(&llm, &question, &quick);

    let mut quick_audio = tts.stream_speech(&quick).await.map_err(ApiError::Speech)?;

    Ok(try_stream! {
        while let Some(chunk) = quick_audio.next().await {
            yield chunk?;
        }

        info!("serving full response");
        let full = full_task.join().await.and_then(|result| result)?;

        let mut full_audio = tts.stream_speech(&full).await?;
        while let Some(chunk) = full_audio.next().await {
            yield chunk?;
        }
    })
}
