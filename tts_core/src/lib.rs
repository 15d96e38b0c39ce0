pub mod stream;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Default upstream API base. Override with [`SpeechClient::with_api_base`].
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Size of the audio frames handed to consumers.
pub const CHUNK_SIZE: usize = 1024;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Async client for the speech synthesis API.
///
/// Streams MP3 bytes for a finalized text without buffering the whole
/// clip. Voice and model are fixed per instance.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    voice: String,
}

impl SpeechClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
        }
    }

    /// Point the client at a different upstream, e.g. a mock server in tests.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Open a streaming synthesis request for `text`.
    ///
    /// Fails before any byte is produced if the upstream rejects the
    /// request. The returned stream yields [`CHUNK_SIZE`]-byte frames
    /// (the last one may be shorter) in arrival order; concatenating
    /// them reconstructs the full clip. The network response is owned
    /// by the stream, so dropping it mid-consumption closes the
    /// connection.
    pub async fn stream_speech(
        &self,
        text: &str,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        debug!(chars = text.len(), voice = %self.voice, "opening speech stream");
        let url = format!("{}/audio/speech", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                response_format: "mp3",
            })
            .send()
            .await
            .context("speech synthesis request failed")?
            .error_for_status()
            .context("speech synthesis returned an error status")?;

        let body = response
            .bytes_stream()
            .map_err(|e| anyhow::Error::new(e).context("error reading speech stream"));
        Ok(stream::rechunk(body, CHUNK_SIZE).boxed())
    }
}
