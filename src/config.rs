use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Recognition backend selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    /// Only the local whisper-cli backend.
    Local,
    /// Only the cloud transcription API.
    Remote,
    /// Remote first, local fallback.
    Auto,
}

impl RecognitionMode {
    /// Label shown in the tray menu.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Local => "Local model",
            Self::Remote => "Cloud API",
            Self::Auto => "Auto (cloud, then local)",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub hotkey: HotkeyConfig,
    pub recognition: RecognitionConfig,
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HotkeyConfig {
    pub modifiers: Vec<String>,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    /// Backend selection policy.
    pub mode: RecognitionMode,
    /// ISO 639-1 language code passed to the backends.
    pub language: String,
    /// Bearer token for the cloud transcription API. Empty disables remote.
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    /// Filename of the selected model within `directory`.
    pub selected: String,
    /// Directory holding downloaded ggml model files.
    pub directory: String,
    /// Recognizer executable (resolved via PATH, or an absolute path).
    pub recognizer: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    /// Directory the captured WAV is written to.
    pub recordings_dir: String,
    /// Keep the captured WAV after transcription instead of deleting it.
    pub keep_recordings: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Attempt simulated keystroke insertion into the frontmost app.
    pub auto_insert: bool,
    /// Post a notification when a transcription completes.
    pub notify: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig {
                modifiers: vec!["Control".to_owned(), "Option".to_owned()],
                key: "Z".to_owned(),
            },
            recognition: RecognitionConfig {
                mode: RecognitionMode::Auto,
                language: "en".to_owned(),
                api_key: String::new(),
            },
            model: ModelConfig {
                selected: crate::transcription::models::DEFAULT_MODEL_FILENAME.to_owned(),
                directory: "~/.murmur/models".to_owned(),
                recognizer: "whisper-cli".to_owned(),
            },
            audio: AudioConfig {
                recordings_dir: "~/.murmur/recordings".to_owned(),
                keep_recordings: false,
            },
            delivery: DeliveryConfig {
                auto_insert: false,
                notify: true,
            },
            logging: LoggingConfig {
                enabled: true,
                max_entries: crate::logbuf::DEFAULT_MAX_ENTRIES,
            },
        }
    }
}

impl Config {
    /// Load config from ~/.murmur.toml, creating it with defaults on first run.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, written, or parsed.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let default = Self::default();
            default.save()?;
            tracing::info!(path = %config_path.display(), "created default config");
            return Ok(default);
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    /// Persist the config back to ~/.murmur.toml.
    ///
    /// # Errors
    /// Returns error if serialization or the write fails.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&config_path, contents).context("failed to write config file")?;
        Ok(())
    }

    /// Path of the config file.
    ///
    /// # Errors
    /// Returns error if HOME is not set.
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".murmur.toml"))
    }

    /// Expand a leading `~/` to the home directory.
    ///
    /// # Errors
    /// Returns error if HOME is not set.
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }

    /// Expanded models directory.
    ///
    /// # Errors
    /// Returns error if HOME is not set.
    pub fn models_dir(&self) -> Result<PathBuf> {
        Self::expand_path(&self.model.directory)
    }

    /// Expanded recordings directory.
    ///
    /// # Errors
    /// Returns error if HOME is not set.
    pub fn recordings_dir(&self) -> Result<PathBuf> {
        Self::expand_path(&self.audio.recordings_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.recognition.mode, RecognitionMode::Auto);
        assert_eq!(parsed.recognition.language, "en");
        assert_eq!(parsed.model.selected, config.model.selected);
        assert!(parsed.logging.enabled);
        assert_eq!(parsed.logging.max_entries, 1000);
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_str.contains("mode = \"auto\""));
    }

    #[test]
    fn test_parse_explicit_config() {
        let toml_str = r#"
[hotkey]
modifiers = ["Command", "Shift"]
key = "V"

[recognition]
mode = "local"
language = "ru"
api_key = "sk-test"

[model]
selected = "ggml-small.bin"
directory = "/tmp/models"
recognizer = "/usr/local/bin/whisper-cli"

[audio]
recordings_dir = "/tmp/recordings"
keep_recordings = true

[delivery]
auto_insert = true
notify = false

[logging]
enabled = false
max_entries = 50
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.recognition.mode, RecognitionMode::Local);
        assert_eq!(config.recognition.api_key, "sk-test");
        assert_eq!(config.model.selected, "ggml-small.bin");
        assert!(config.audio.keep_recordings);
        assert!(!config.delivery.notify);
        assert_eq!(config.logging.max_entries, 50);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/models/file.bin").unwrap();
        assert_eq!(result, PathBuf::from(home).join("models/file.bin"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let result = Config::expand_path("/var/tmp/file.bin").unwrap();
        assert_eq!(result, PathBuf::from("/var/tmp/file.bin"));
    }

    #[test]
    fn test_mode_display_names() {
        assert_eq!(RecognitionMode::Local.display_name(), "Local model");
        assert_eq!(RecognitionMode::Remote.display_name(), "Cloud API");
        assert!(RecognitionMode::Auto.display_name().contains("cloud"));
    }
}
