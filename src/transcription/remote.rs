//! Cloud transcription via an OpenAI-compatible audio transcriptions API.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use super::{RecognitionBackend, RecognitionError};
use crate::audio::AudioFile;

const API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Posts recordings to the cloud transcription endpoint.
pub struct RemoteBackend {
    api_key: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl RemoteBackend {
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(api_key: String) -> Result<Self, RecognitionError> {
        Self::with_endpoint(api_key, API_URL.to_owned())
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn with_endpoint(api_key: String, endpoint: String) -> Result<Self, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RecognitionError::Api(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            endpoint,
            client,
        })
    }
}

impl RecognitionBackend for RemoteBackend {
    fn transcribe(&self, audio: &AudioFile, language: &str) -> Result<String, RecognitionError> {
        if self.api_key.is_empty() {
            return Err(RecognitionError::NoApiKey);
        }

        let form = reqwest::blocking::multipart::Form::new()
            .file("file", &audio.path)
            .map_err(|e| RecognitionError::Api(format!("failed to attach audio file: {e}")))?
            .text("model", "whisper-1")
            .text("response_format", "json")
            .text("language", language.to_owned());

        info!(endpoint = %self.endpoint, language, "posting audio to transcription API");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| RecognitionError::Api(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecognitionError::Api(format!(
                "API returned {status}: {}",
                body.trim()
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .map_err(|e| RecognitionError::Api(format!("invalid API response: {e}")))?;

        Ok(parsed.text)
    }

    fn name(&self) -> &str {
        "remote"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}
