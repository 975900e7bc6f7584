//! Speech-to-text (STT) for the built-in wake-word engine

use crate::config::{DEFAULT_STT_URL, SttConfig};
use crate::{Error, Result};

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes short WAV clips
pub struct SpeechToText {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    language: String,
}

impl SpeechToText {
    /// Create a transcriber for `language` (BCP-47, e.g. "pt-BR")
    ///
    /// # Errors
    ///
    /// Returns `Error::Initialization` if the hosted endpoint is used without an API key
    pub fn new(config: &SttConfig, language: &str) -> Result<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());
        if api_key.is_none() && config.base_url == DEFAULT_STT_URL {
            return Err(Error::Initialization(
                "speech recognition unavailable: OPENAI_API_KEY is not set".to_string(),
            ));
        }

        // Transcription APIs take ISO-639-1, not a full locale
        let language = language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/audio/transcriptions", config.base_url),
            api_key,
            model: config.model.clone(),
            language,
        })
    }

    /// Transcribe audio to text
    ///
    /// # Arguments
    ///
    /// * `audio` - WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Connectivity` if the request fails and `Error::Api` on a non-success status
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone());
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "transcription request failed");
            Error::Connectivity(e.to_string())
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "transcription API error");
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to parse transcription response");
            Error::Recognition(e.to_string())
        })?;

        let text = result.text.trim().to_string();
        tracing::debug!(transcript = %text, "transcription complete");
        Ok(text)
    }

    /// Language code sent with each request
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }
}
