//! Whisper model catalog, downloads and selection.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Fallback selection when nothing else is installed.
pub const DEFAULT_MODEL_FILENAME: &str = "ggml-tiny.bin";

/// Model management failures.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model: {0}")]
    NotInCatalog(String),
    #[error("model download failed: {0}")]
    Download(String),
    #[error("failed to save model: {0}")]
    Save(String),
}

/// A downloadable ggml whisper model.
#[derive(Debug, Clone, Copy)]
pub struct WhisperModel {
    pub filename: &'static str,
    pub display_name: &'static str,
    /// Approximate download size, for menu labels.
    pub size_bytes: u64,
    pub download_url: &'static str,
    pub recommended: bool,
}

impl WhisperModel {
    /// Human-readable size, e.g. "75 MB" or "1.5 GB".
    #[must_use]
    pub fn size_label(&self) -> String {
        #[allow(clippy::cast_precision_loss)] // Display only
        let gb = self.size_bytes as f64 / 1_000_000_000.0;
        if gb >= 1.0 {
            format!("{gb:.1} GB")
        } else {
            format!("{} MB", self.size_bytes / 1_000_000)
        }
    }
}

macro_rules! model {
    ($name:literal, $display:literal, $size:expr, $recommended:expr) => {
        WhisperModel {
            filename: concat!("ggml-", $name, ".bin"),
            display_name: $display,
            size_bytes: $size,
            download_url: concat!(
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-",
                $name,
                ".bin"
            ),
            recommended: $recommended,
        }
    };
}

/// All downloadable models, smallest first.
pub const CATALOG: [WhisperModel; 7] = [
    model!("tiny", "Tiny", 77_700_000, true),
    model!("base", "Base", 148_000_000, false),
    model!("small", "Small", 488_000_000, false),
    model!("medium", "Medium", 1_530_000_000, false),
    model!("large", "Large", 3_090_000_000, false),
    model!("large-v2", "Large v2", 3_090_000_000, false),
    model!("large-v3", "Large v3", 3_100_000_000, false),
];

/// Look up a catalog entry by filename.
///
/// # Errors
/// Returns `NotInCatalog` for unknown filenames.
pub fn find(filename: &str) -> Result<&'static WhisperModel, ModelError> {
    CATALOG
        .iter()
        .find(|m| m.filename == filename)
        .ok_or_else(|| ModelError::NotInCatalog(filename.to_owned()))
}

/// In-flight downloads, owned by the event loop. A download streams to
/// `<filename>.part`, so two concurrent downloads of the same model would
/// interleave writes into one file; the tracker rejects the second request.
#[derive(Debug, Default)]
pub struct DownloadTracker {
    in_flight: HashSet<String>,
}

impl DownloadTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a download as started. Returns `false` when one is already
    /// running for this model; the caller must not spawn another.
    pub fn begin(&mut self, filename: &str) -> bool {
        self.in_flight.insert(filename.to_owned())
    }

    /// Mark a download as finished, whether it succeeded or failed.
    pub fn finish(&mut self, filename: &str) {
        self.in_flight.remove(filename);
    }

    #[must_use]
    pub fn is_downloading(&self, filename: &str) -> bool {
        self.in_flight.contains(filename)
    }
}

/// Manages the on-disk model directory.
pub struct ModelLibrary {
    models_dir: PathBuf,
}

impl ModelLibrary {
    #[must_use]
    pub const fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }

    /// Full path a model lives at when installed.
    #[must_use]
    pub fn model_path(&self, filename: &str) -> PathBuf {
        self.models_dir.join(filename)
    }

    /// Installed state is derived from filesystem presence.
    #[must_use]
    pub fn is_installed(&self, filename: &str) -> bool {
        self.model_path(filename).exists()
    }

    /// Catalog entries currently present on disk, catalog order.
    #[must_use]
    pub fn installed_models(&self) -> Vec<&'static WhisperModel> {
        CATALOG
            .iter()
            .filter(|m| self.is_installed(m.filename))
            .collect()
    }

    /// Download a catalog model, streaming to a `.part` file with fractional
    /// progress callbacks, then moving it into place (removing any stale
    /// copy first).
    ///
    /// # Errors
    /// Returns `NotInCatalog`, `Download` for HTTP failures, `Save` for
    /// filesystem failures.
    pub fn download(
        &self,
        filename: &str,
        progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf, ModelError> {
        let model = find(filename)?;
        let final_path = self.model_path(filename);
        let part_path = self.models_dir.join(format!("{filename}.part"));

        fs::create_dir_all(&self.models_dir)
            .map_err(|e| ModelError::Save(format!("failed to create models directory: {e}")))?;

        info!(url = model.download_url, "downloading model");

        let mut response = reqwest::blocking::get(model.download_url)
            .map_err(|e| ModelError::Download(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ModelError::Download(format!(
                "server returned {}",
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(model.size_bytes);

        let result = Self::stream_to_part(&mut response, &part_path, total, progress);
        if let Err(e) = result {
            let _ = fs::remove_file(&part_path);
            return Err(e);
        }

        // Remove-then-move into place.
        if final_path.exists() {
            fs::remove_file(&final_path)
                .map_err(|e| ModelError::Save(format!("failed to replace existing model: {e}")))?;
        }
        fs::rename(&part_path, &final_path)
            .map_err(|e| ModelError::Save(format!("failed to move model into place: {e}")))?;

        info!(path = %final_path.display(), "model installed");
        Ok(final_path)
    }

    fn stream_to_part(
        response: &mut reqwest::blocking::Response,
        part_path: &Path,
        total: u64,
        progress: &mut dyn FnMut(f64),
    ) -> Result<(), ModelError> {
        let mut file = fs::File::create(part_path)
            .map_err(|e| ModelError::Save(format!("failed to create temp file: {e}")))?;

        let mut downloaded: u64 = 0;
        let mut buf = [0_u8; 64 * 1024];
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| ModelError::Download(format!("read failed: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| ModelError::Save(format!("write failed: {e}")))?;
            downloaded += n as u64;
            if total > 0 {
                #[allow(clippy::cast_precision_loss)] // Progress display only
                progress((downloaded as f64 / total as f64).min(1.0));
            }
        }

        file.sync_all()
            .map_err(|e| ModelError::Save(format!("sync failed: {e}")))?;
        Ok(())
    }

    /// Delete an installed model. When the deleted model was the current
    /// selection, returns the replacement the caller must persist: the first
    /// remaining installed model, or the hardcoded default.
    ///
    /// # Errors
    /// Returns `Save` if the file cannot be removed.
    pub fn delete(&self, filename: &str, selected: &str) -> Result<Option<String>, ModelError> {
        let path = self.model_path(filename);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ModelError::Save(format!("failed to delete model: {e}")))?;
        }
        info!(model = filename, "model deleted");

        if filename != selected {
            return Ok(None);
        }

        let replacement = self
            .installed_models()
            .first()
            .map_or(DEFAULT_MODEL_FILENAME, |m| m.filename)
            .to_owned();
        Ok(Some(replacement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

    #[test]
    fn test_catalog_shape() {
        assert_eq!(CATALOG.len(), 7);
        // Exactly one recommended model, and it is the default
        let recommended: Vec<_> = CATALOG.iter().filter(|m| m.recommended).collect();
        assert_eq!(recommended.len(), 1);
        assert_eq!(recommended[0].filename, DEFAULT_MODEL_FILENAME);

        for model in &CATALOG {
            assert!(model.filename.starts_with("ggml-"));
            assert!(model.filename.ends_with(".bin"));
            assert!(model.download_url.starts_with(MODEL_BASE_URL));
            assert!(model.download_url.ends_with(model.filename));
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("ggml-small.bin").unwrap().display_name, "Small");
        assert!(matches!(
            find("ggml-unknown.bin"),
            Err(ModelError::NotInCatalog(_))
        ));
    }

    #[test]
    fn test_size_labels() {
        assert_eq!(find("ggml-tiny.bin").unwrap().size_label(), "77 MB");
        assert_eq!(find("ggml-medium.bin").unwrap().size_label(), "1.5 GB");
    }

    #[test]
    fn test_installed_state_from_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let library = ModelLibrary::new(dir.path().to_path_buf());

        assert!(!library.is_installed("ggml-tiny.bin"));
        assert!(library.installed_models().is_empty());

        fs::write(library.model_path("ggml-tiny.bin"), b"x").unwrap();
        fs::write(library.model_path("ggml-small.bin"), b"x").unwrap();

        assert!(library.is_installed("ggml-tiny.bin"));
        let installed = library.installed_models();
        assert_eq!(installed.len(), 2);
        // Catalog order, smallest first
        assert_eq!(installed[0].filename, "ggml-tiny.bin");
        assert_eq!(installed[1].filename, "ggml-small.bin");
    }

    #[test]
    fn test_delete_non_selected_keeps_selection() {
        let dir = tempfile::tempdir().unwrap();
        let library = ModelLibrary::new(dir.path().to_path_buf());
        fs::write(library.model_path("ggml-base.bin"), b"x").unwrap();

        let result = library.delete("ggml-base.bin", "ggml-tiny.bin").unwrap();
        assert!(result.is_none());
        assert!(!library.is_installed("ggml-base.bin"));
    }

    #[test]
    fn test_delete_selected_reselects_first_installed() {
        let dir = tempfile::tempdir().unwrap();
        let library = ModelLibrary::new(dir.path().to_path_buf());
        fs::write(library.model_path("ggml-base.bin"), b"x").unwrap();
        fs::write(library.model_path("ggml-medium.bin"), b"x").unwrap();

        let result = library.delete("ggml-base.bin", "ggml-base.bin").unwrap();
        assert_eq!(result.as_deref(), Some("ggml-medium.bin"));
    }

    #[test]
    fn test_delete_last_model_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let library = ModelLibrary::new(dir.path().to_path_buf());
        fs::write(library.model_path("ggml-large.bin"), b"x").unwrap();

        let result = library.delete("ggml-large.bin", "ggml-large.bin").unwrap();
        assert_eq!(result.as_deref(), Some(DEFAULT_MODEL_FILENAME));
    }

    #[test]
    fn test_download_tracker_rejects_duplicate() {
        let mut tracker = DownloadTracker::new();
        assert!(tracker.begin("ggml-tiny.bin"));
        assert!(tracker.is_downloading("ggml-tiny.bin"));
        // A second request for the same model must not start another writer
        // on the shared .part path
        assert!(!tracker.begin("ggml-tiny.bin"));
        // Other models are unaffected
        assert!(tracker.begin("ggml-base.bin"));
    }

    #[test]
    fn test_download_tracker_allows_retry_after_finish() {
        let mut tracker = DownloadTracker::new();
        assert!(tracker.begin("ggml-tiny.bin"));
        tracker.finish("ggml-tiny.bin");
        assert!(!tracker.is_downloading("ggml-tiny.bin"));
        assert!(tracker.begin("ggml-tiny.bin"));
    }

    #[test]
    fn test_download_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let library = ModelLibrary::new(dir.path().to_path_buf());

        let result = library.download("ggml-bogus.bin", &mut |_| {});
        assert!(matches!(result, Err(ModelError::NotInCatalog(_))));
    }

    #[test]
    #[ignore = "requires network access and downloads a large file"]
    fn test_download_tiny_model_integration() {
        let dir = tempfile::tempdir().unwrap();
        let library = ModelLibrary::new(dir.path().to_path_buf());

        let mut last_progress = 0.0_f64;
        let path = library
            .download("ggml-tiny.bin", &mut |p| last_progress = p)
            .unwrap();

        assert!(path.exists());
        assert!(fs::metadata(&path).unwrap().len() > 0);
        assert!(last_progress > 0.9);
        // No .part left behind
        assert!(!dir.path().join("ggml-tiny.bin.part").exists());
    }
}
