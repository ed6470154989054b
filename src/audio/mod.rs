//! Microphone capture and sample-format conversion.

pub mod capture;
pub mod convert;

use std::path::PathBuf;

use thiserror::Error;

/// PCM layout of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// 16 kHz mono s16, what whisper-cli expects.
    pub const WHISPER: Self = Self {
        sample_rate: 16_000,
        channels: 1,
        bits_per_sample: 16,
    };
}

/// A WAV file on disk with its known format.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub size_bytes: u64,
}

/// Capture failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone access denied - enable in System Settings > Privacy & Security > Microphone")]
    PermissionDenied,
    #[error("audio device error: {0}")]
    DeviceError(String),
}

/// Conversion failures.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("recording contains no audio")]
    NoAudioTrack,
    #[error("audio conversion failed: {0}")]
    ConversionFailed(String),
}
