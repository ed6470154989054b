//! Local transcription via the whisper-cli executable.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info, warn};

use super::{RecognitionBackend, RecognitionError};
use crate::audio::{self, AudioFile, AudioFormat};

/// Runs `whisper-cli` against a downloaded ggml model.
pub struct LocalBackend {
    /// Recognizer executable (PATH name or absolute path).
    recognizer: String,
    /// Full path of the selected model file.
    model_path: PathBuf,
}

impl LocalBackend {
    #[must_use]
    pub const fn new(recognizer: String, model_path: PathBuf) -> Self {
        Self {
            recognizer,
            model_path,
        }
    }

    fn recognizer_resolvable(&self) -> bool {
        let path = PathBuf::from(&self.recognizer);
        if path.is_absolute() {
            path.exists()
        } else {
            // PATH lookup happens at spawn; treat a bare name as present.
            true
        }
    }

    /// Run the recognizer and collect its text output: stdout when
    /// non-empty, otherwise the `<wav>.txt` sidecar it writes for `-otxt`.
    fn run_recognizer(&self, wav: &AudioFile, language: &str) -> Result<String, RecognitionError> {
        let output = Command::new(&self.recognizer)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(&wav.path)
            .arg("-l")
            .arg(language)
            .arg("-otxt")
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RecognitionError::ModelNotFound(format!(
                        "recognizer executable not found: {}",
                        self.recognizer
                    ))
                } else {
                    RecognitionError::TranscriptionFailed(format!(
                        "failed to run recognizer: {e}"
                    ))
                }
            })?;

        let sidecar = PathBuf::from(format!("{}.txt", wav.path.display()));

        if !output.status.success() {
            let _ = std::fs::remove_file(&sidecar);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::TranscriptionFailed(format!(
                "recognizer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if !stdout.is_empty() {
            let _ = std::fs::remove_file(&sidecar);
            debug!("recognizer output taken from stdout");
            return Ok(stdout);
        }

        // Sidecar fallback; consume it, then remove it.
        let text = std::fs::read_to_string(&sidecar).map_err(|_| {
            RecognitionError::TranscriptionFailed("recognizer produced no output".to_owned())
        })?;
        let _ = std::fs::remove_file(&sidecar);
        debug!("recognizer output taken from sidecar file");
        Ok(text.trim().to_owned())
    }
}

impl RecognitionBackend for LocalBackend {
    fn transcribe(&self, audio: &AudioFile, language: &str) -> Result<String, RecognitionError> {
        if !self.model_path.exists() {
            return Err(RecognitionError::ModelNotFound(
                self.model_path.display().to_string(),
            ));
        }

        let converted = audio::convert::convert(audio, AudioFormat::WHISPER)?;

        info!(
            model = %self.model_path.display(),
            wav = %converted.path.display(),
            language,
            "running local recognizer"
        );
        let result = self.run_recognizer(&converted, language);

        // The converted temp belongs to us once its content is consumed; the
        // identity fast-path returns the caller's file, which stays.
        if converted.path != audio.path {
            if let Err(e) = std::fs::remove_file(&converted.path) {
                warn!(error = %e, "failed to remove converted temp file");
            }
        }

        result
    }

    fn name(&self) -> &str {
        "local"
    }

    fn is_available(&self) -> bool {
        self.model_path.exists() && self.recognizer_resolvable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn whisper_wav(dir: &std::path::Path) -> AudioFile {
        let path = dir.join("input.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(1000_i16).unwrap();
        }
        writer.finalize().unwrap();
        AudioFile {
            size_bytes: std::fs::metadata(&path).unwrap().len(),
            path,
            format: AudioFormat::WHISPER,
        }
    }

    fn fake_recognizer(dir: &std::path::Path, script_body: &str) -> String {
        let path = dir.join("fake-whisper-cli");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn fake_model(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("ggml-tiny.bin");
        std::fs::write(&path, b"model").unwrap();
        path
    }

    #[test]
    fn test_missing_model_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(
            "whisper-cli".to_owned(),
            dir.path().join("missing-model.bin"),
        );
        assert!(!backend.is_available());

        let audio = whisper_wav(dir.path());
        let err = backend.transcribe(&audio, "en").unwrap_err();
        assert!(matches!(err, RecognitionError::ModelNotFound(_)));
    }

    #[test]
    fn test_stdout_output() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = fake_recognizer(dir.path(), "echo ' hello from cli '");
        let backend = LocalBackend::new(recognizer, fake_model(dir.path()));
        assert!(backend.is_available());

        let audio = whisper_wav(dir.path());
        let text = backend.transcribe(&audio, "en").unwrap();
        assert_eq!(text, "hello from cli");
        // Input file untouched (identity fast-path)
        assert!(audio.path.exists());
    }

    #[test]
    fn test_sidecar_fallback_when_stdout_empty() {
        let dir = tempfile::tempdir().unwrap();
        // $4 is the wav path (-m model -f wav ...); write the sidecar only
        let recognizer = fake_recognizer(dir.path(), "printf 'sidecar text' > \"$4.txt\"");
        let backend = LocalBackend::new(recognizer, fake_model(dir.path()));

        let audio = whisper_wav(dir.path());
        let text = backend.transcribe(&audio, "en").unwrap();
        assert_eq!(text, "sidecar text");

        // Sidecar consumed and removed
        let sidecar = PathBuf::from(format!("{}.txt", audio.path.display()));
        assert!(!sidecar.exists());
    }

    #[test]
    fn test_nonzero_exit_is_transcription_failed() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = fake_recognizer(dir.path(), "echo 'bad model file' >&2; exit 3");
        let backend = LocalBackend::new(recognizer, fake_model(dir.path()));

        let audio = whisper_wav(dir.path());
        let err = backend.transcribe(&audio, "en").unwrap_err();
        match err {
            RecognitionError::TranscriptionFailed(msg) => {
                assert!(msg.contains("bad model file"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_output_at_all_fails() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = fake_recognizer(dir.path(), "exit 0");
        let backend = LocalBackend::new(recognizer, fake_model(dir.path()));

        let audio = whisper_wav(dir.path());
        let err = backend.transcribe(&audio, "en").unwrap_err();
        assert!(matches!(err, RecognitionError::TranscriptionFailed(_)));
    }

    #[test]
    fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(
            "/nonexistent/whisper-cli".to_owned(),
            fake_model(dir.path()),
        );
        assert!(!backend.is_available());

        let audio = whisper_wav(dir.path());
        let err = backend.transcribe(&audio, "en").unwrap_err();
        assert!(matches!(err, RecognitionError::ModelNotFound(_)));
    }

    #[test]
    fn test_language_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        // $6 is the language argument
        let recognizer = fake_recognizer(dir.path(), "echo \"lang=$6\"");
        let backend = LocalBackend::new(recognizer, fake_model(dir.path()));

        let audio = whisper_wav(dir.path());
        let text = backend.transcribe(&audio, "ru").unwrap();
        assert_eq!(text, "lang=ru");
    }
}
