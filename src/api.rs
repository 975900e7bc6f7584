//! Voice API client
//!
//! Posts a captured question to `POST /voice` as multipart form data and
//! receives the spoken reply as raw audio bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{ApiConfig, ProbeMode};
use crate::voice::{AudioPayload, WAV_CONTENT_TYPE};
use crate::{Error, Result};

/// Upload file name used for questions
pub const QUESTION_FILE_NAME: &str = "pergunta.wav";

/// Text spoken by the `/tts` liveness probe
const PROBE_TEXT: &str = "teste";

/// Turns a recorded question into a spoken reply
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Submit a question and wait for the reply audio
    ///
    /// # Errors
    ///
    /// Returns `Error::Connectivity` on network failure or timeout and
    /// `Error::Api` on a non-success status
    async fn submit(&self, question: AudioPayload) -> Result<AudioPayload>;
}

/// HTTP client for the voice API
pub struct VoiceApiClient {
    client: Client,
    base_url: String,
    probe: ProbeMode,
    probe_timeout: Duration,
}

impl VoiceApiClient {
    /// Create a client for `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("inocencio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            probe: config.probe,
            probe_timeout: config.probe_timeout,
        })
    }

    /// Check that the API is reachable
    ///
    /// # Errors
    ///
    /// Returns `Error::Connectivity` if the probe fails or times out and
    /// `Error::Api` if it answers with a non-success status
    pub async fn probe(&self) -> Result<()> {
        let request = match self.probe {
            ProbeMode::Check => self.client.get(self.url("/check")),
            ProbeMode::Tts => self
                .client
                .get(self.url("/tts"))
                .query(&[("text", PROBE_TEXT)]),
        };

        let response = request
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| connectivity(&self.base_url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(url = %self.base_url, "voice API reachable");
        Ok(())
    }

    /// API base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl VoiceBackend for VoiceApiClient {
    async fn submit(&self, question: AudioPayload) -> Result<AudioPayload> {
        tracing::info!(
            size_kib = format!("{:.2}", question.kib()),
            content_type = %question.content_type,
            "sending question"
        );

        let part = reqwest::multipart::Part::bytes(question.bytes)
            .file_name(QUESTION_FILE_NAME)
            .mime_str(&question.content_type)
            .map_err(|e| Error::Audio(format!("invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/voice"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| connectivity(&self.base_url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "voice API error");
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(WAV_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| connectivity(&self.base_url, &e))?;

        let reply = AudioPayload::new(bytes.to_vec(), content_type);
        tracing::info!(
            size_kib = format!("{:.2}", reply.kib()),
            content_type = %reply.content_type,
            "reply received"
        );
        Ok(reply)
    }
}

fn connectivity(base_url: &str, error: &reqwest::Error) -> Error {
    if error.is_timeout() {
        tracing::warn!(url = base_url, "voice API request timed out");
        Error::Connectivity(format!("request to {base_url} timed out"))
    } else {
        tracing::warn!(url = base_url, error = %error, "voice API unreachable");
        Error::Connectivity(format!("API not reachable at {base_url}: {error}"))
    }
}
