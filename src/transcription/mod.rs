//! Speech recognition backends and fallback orchestration.

/// Local whisper-cli subprocess backend
pub mod local;
/// Whisper model catalog, downloads and selection
pub mod models;
/// Cloud transcription API backend
pub mod remote;

use thiserror::Error;

use crate::audio::AudioFile;
use crate::config::RecognitionMode;

/// Recognition failures, per backend and pre-flight.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("audio file not found: {0}")]
    FileNotFound(String),
    #[error("audio file is empty")]
    EmptyFile,
    #[error("model or recognizer not found: {0}")]
    ModelNotFound(String),
    #[error("no API key configured")]
    NoApiKey,
    #[error("transcription API error: {0}")]
    Api(String),
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("audio conversion failed: {0}")]
    Conversion(#[from] crate::audio::ConversionError),
    #[error("no recognition backend available")]
    NoBackend,
}

/// A speech recognition backend.
#[cfg_attr(test, mockall::automock)]
pub trait RecognitionBackend: Send {
    /// Transcribe `audio` to text in `language`.
    ///
    /// # Errors
    /// Returns a [`RecognitionError`] describing the failure.
    fn transcribe(&self, audio: &AudioFile, language: &str) -> Result<String, RecognitionError>;

    /// Short name for logging and notifications.
    fn name(&self) -> &str;

    /// Whether the backend can currently run (credential present, model
    /// installed). Unavailable backends are skipped by the orchestrator.
    fn is_available(&self) -> bool;
}

/// Runs backends in order with fallback.
pub struct Orchestrator {
    backends: Vec<Box<dyn RecognitionBackend>>,
}

impl Orchestrator {
    /// Build an orchestrator for `mode` from the two concrete backends.
    ///
    /// Auto tries the cloud API first and falls back to the local model.
    #[must_use]
    pub fn for_mode(
        mode: RecognitionMode,
        local: Box<dyn RecognitionBackend>,
        remote: Box<dyn RecognitionBackend>,
    ) -> Self {
        let backends = match mode {
            RecognitionMode::Local => vec![local],
            RecognitionMode::Remote => vec![remote],
            RecognitionMode::Auto => vec![remote, local],
        };
        Self { backends }
    }

    /// Build an orchestrator from an explicit backend list (mostly tests).
    #[must_use]
    pub fn new(backends: Vec<Box<dyn RecognitionBackend>>) -> Self {
        Self { backends }
    }

    /// Transcribe with fallback: pre-flight checks, then each available
    /// backend in order. First success wins; when all fail, the last
    /// backend's failure is returned.
    ///
    /// # Errors
    /// `FileNotFound` / `EmptyFile` before any backend runs, `NoBackend`
    /// when no backend is available, otherwise the last backend failure.
    pub fn transcribe(&self, audio: &AudioFile, language: &str) -> Result<String, RecognitionError> {
        preflight(audio)?;

        let mut last_error = RecognitionError::NoBackend;
        let mut attempted = false;

        for backend in &self.backends {
            if !backend.is_available() {
                tracing::debug!(backend = backend.name(), "skipping unavailable backend");
                continue;
            }
            attempted = true;

            tracing::info!(backend = backend.name(), "attempting transcription");
            match backend.transcribe(audio, language) {
                Ok(text) => {
                    tracing::info!(backend = backend.name(), chars = text.len(), "transcribed");
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "backend failed");
                    last_error = e;
                }
            }
        }

        if !attempted {
            return Err(RecognitionError::NoBackend);
        }
        Err(last_error)
    }
}

/// Validate the audio file before any backend runs.
fn preflight(audio: &AudioFile) -> Result<(), RecognitionError> {
    let metadata = std::fs::metadata(&audio.path)
        .map_err(|_| RecognitionError::FileNotFound(audio.path.display().to_string()))?;
    if metadata.len() == 0 {
        return Err(RecognitionError::EmptyFile);
    }
    Ok(())
}
