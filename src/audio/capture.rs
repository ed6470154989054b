//! Microphone capture via CoreAudio/CPAL.
//!
//! A single input stream is opened at startup and kept paused; push-to-talk
//! resumes and pauses it. The cpal callback thread communicates only through
//! a lock-free ring buffer and an `AtomicBool`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{AudioFile, AudioFormat, CaptureError};
use crate::permissions::MicAuthorization;

/// Filename of the capture output, overwritten on every recording.
const RECORDING_FILENAME: &str = "recording.wav";

/// Trait for controlling audio stream lifecycle
trait StreamControl {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<(), CaptureError>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<(), CaptureError>;
}

/// CPAL stream wrapper implementing `StreamControl`
struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<(), CaptureError> {
        self.stream
            .play()
            .map_err(|e| CaptureError::DeviceError(format!("failed to resume stream: {e}")))
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.stream
            .pause()
            .map_err(|e| CaptureError::DeviceError(format!("failed to pause stream: {e}")))
    }
}

/// Microphone recorder writing a WAV file per session.
pub struct Recorder {
    /// Stream controller (kept alive to prevent stream drop)
    #[allow(dead_code)] // Kept alive to prevent stream drop
    stream_control: Option<Box<dyn StreamControl>>,
    /// Ring buffer consumer for reading captured samples
    ring_buffer_consumer: HeapCons<f32>,
    /// Recording state flag
    is_recording: Arc<AtomicBool>,
    /// Device sample rate in Hz
    device_sample_rate: u32,
    /// Number of audio channels
    device_channels: u16,
    /// Directory the capture WAV is written to
    recordings_dir: PathBuf,
}

impl Recorder {
    /// Open the default input device and prepare a paused stream.
    ///
    /// # Errors
    /// Returns `PermissionDenied` when microphone access is refused, or
    /// `DeviceError` if no input device is available or stream creation fails.
    pub fn new(authorization: MicAuthorization, recordings_dir: &Path) -> Result<Self, CaptureError> {
        if !authorization.allows_capture() {
            return Err(CaptureError::PermissionDenied);
        }

        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceError("no input device available".to_owned()))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        // Use the device default format; conversion to the recognizer's
        // format happens downstream.
        let supported_config = device.default_input_config().map_err(|e| {
            CaptureError::DeviceError(format!("failed to get default input config: {e}"))
        })?;

        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        // Ring buffer sized for the max recording duration (30s at device
        // rate) so no samples are dropped during a session.
        let max_recording_secs = 30;
        let ring_buffer_capacity =
            (device_sample_rate as usize) * (device_channels as usize) * max_recording_secs;
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (ring_buffer_producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));

        let is_recording_clone = Arc::clone(&is_recording);
        let mut producer = ring_buffer_producer;

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_clone.load(Ordering::Relaxed) {
                        // Lock-free push to ring buffer
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                CaptureError::DeviceError(format!("failed to build input stream: {e}"))
            })?;

        let stream_control = CpalStreamControl { stream };

        // Start the stream and immediately pause it (mic inactive until the
        // hotkey is pressed).
        stream_control.play()?;
        stream_control.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Some(Box::new(stream_control)),
            ring_buffer_consumer,
            is_recording,
            device_sample_rate,
            device_channels,
            recordings_dir: recordings_dir.to_path_buf(),
        })
    }

    /// Whether a recording session is active.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::Relaxed)
    }

    /// Start a recording session. Starting while already recording is a
    /// logged no-op.
    ///
    /// # Errors
    /// Returns error if the stream cannot be resumed.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_recording.load(Ordering::Relaxed) {
            warn!("start ignored: recording already active");
            return Ok(());
        }

        let start = std::time::Instant::now();
        debug!("starting recording");

        self.ring_buffer_consumer.clear();

        // Set recording flag BEFORE resuming stream to avoid race condition
        self.is_recording.store(true, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.play()?;
        }

        info!(latency_us = start.elapsed().as_micros(), "recording started");
        Ok(())
    }

    /// Stop recording, write the captured samples to the session WAV file
    /// (device rate/channels, 16-bit PCM, overwriting any prior recording)
    /// and return a handle to it.
    ///
    /// # Errors
    /// Returns error if the stream cannot be paused or the file written.
    pub fn stop(&mut self) -> Result<AudioFile, CaptureError> {
        let start_total = std::time::Instant::now();
        debug!("stopping recording");

        self.is_recording.store(false, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.pause()?;
        }

        let mut samples = Vec::new();
        while let Some(sample) = self.ring_buffer_consumer.try_pop() {
            samples.push(sample);
        }
        info!(samples = samples.len(), "ring buffer drained");

        let format = AudioFormat {
            sample_rate: self.device_sample_rate,
            channels: self.device_channels,
            bits_per_sample: 16,
        };
        let path = self.recordings_dir.join(RECORDING_FILENAME);
        let audio = write_wav(&samples, format, &path)?;

        info!(
            total_ms = start_total.elapsed().as_millis(),
            size_bytes = audio.size_bytes,
            "recording stopped"
        );
        Ok(audio)
    }
}

/// Write f32 samples as a 16-bit PCM WAV file at `path`, overwriting.
fn write_wav(samples: &[f32], format: AudioFormat, path: &Path) -> Result<AudioFile, CaptureError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CaptureError::DeviceError(format!("failed to create recordings directory: {e}"))
        })?;
    }

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| CaptureError::DeviceError(format!("failed to create WAV file: {e}")))?;

    for &sample in samples {
        writer
            .write_sample(f32_to_i16(sample))
            .map_err(|e| CaptureError::DeviceError(format!("failed to write sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| CaptureError::DeviceError(format!("failed to finalize WAV file: {e}")))?;

    let size_bytes = std::fs::metadata(path)
        .map_err(|e| CaptureError::DeviceError(format!("failed to stat WAV file: {e}")))?
        .len();

    Ok(AudioFile {
        path: path.to_path_buf(),
        format,
        size_bytes,
    })
}

/// Clamp and scale an f32 sample in [-1, 1] to i16.
#[allow(clippy::cast_possible_truncation)] // Clamped before the cast
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // Test assertions with known exact values
mod tests {
    use super::*;

    // Mock StreamControl for testing
    struct MockStreamControl {
        play_called: Arc<AtomicBool>,
        pause_called: Arc<AtomicBool>,
    }

    impl StreamControl for MockStreamControl {
        fn play(&self) -> Result<(), CaptureError> {
            self.play_called.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn pause(&self) -> Result<(), CaptureError> {
            self.pause_called.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn mock_recorder(dir: &Path) -> (Recorder, Arc<AtomicBool>, Arc<AtomicBool>) {
        let play_called = Arc::new(AtomicBool::new(false));
        let pause_called = Arc::new(AtomicBool::new(false));
        let mock_stream = MockStreamControl {
            play_called: Arc::clone(&play_called),
            pause_called: Arc::clone(&pause_called),
        };

        let ring_buffer = HeapRb::<f32>::new(1024);
        let (_, consumer) = ring_buffer.split();

        let recorder = Recorder {
            stream_control: Some(Box::new(mock_stream)),
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(false)),
            device_sample_rate: 48000,
            device_channels: 2,
            recordings_dir: dir.to_path_buf(),
        };
        (recorder, play_called, pause_called)
    }

    #[test]
    fn test_denied_authorization_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let result = Recorder::new(MicAuthorization::Denied, dir.path());
        assert!(matches!(result, Err(CaptureError::PermissionDenied)));

        let result = Recorder::new(MicAuthorization::Restricted, dir.path());
        assert!(matches!(result, Err(CaptureError::PermissionDenied)));
    }

    #[test]
    fn test_start_stop_drive_stream_control() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, play_called, pause_called) = mock_recorder(dir.path());

        recorder.start().unwrap();
        assert!(play_called.load(Ordering::Relaxed));
        assert!(recorder.is_recording());

        let audio = recorder.stop().unwrap();
        assert!(pause_called.load(Ordering::Relaxed));
        assert!(!recorder.is_recording());
        assert_eq!(audio.format.sample_rate, 48000);
        assert_eq!(audio.format.channels, 2);
        assert!(audio.path.exists());
    }

    #[test]
    fn test_start_while_recording_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, play_called, _) = mock_recorder(dir.path());

        recorder.start().unwrap();
        play_called.store(false, Ordering::Relaxed);

        // Second start must not touch the stream
        recorder.start().unwrap();
        assert!(!play_called.load(Ordering::Relaxed));
        assert!(recorder.is_recording());
    }

    #[test]
    fn test_f32_to_i16_conversion() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        // Out-of-range input is clamped
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-3.0), -i16::MAX);
    }

    #[test]
    fn test_write_wav_spec_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.wav");
        let format = AudioFormat {
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: 16,
        };

        let audio = write_wav(&[0.1, 0.2, 0.3], format, &path).unwrap();
        assert_eq!(audio.size_bytes, std::fs::metadata(&path).unwrap().len());

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.len(), 3);

        // Overwrites the previous session
        let audio2 = write_wav(&[0.5], format, &path).unwrap();
        let reader2 = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader2.len(), 1);
        assert!(audio2.size_bytes < audio.size_bytes);
    }

    #[test]
    fn test_write_wav_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("recording.wav");
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
        };

        let audio = write_wav(&[0.1, 0.2], format, &nested).unwrap();
        assert!(audio.path.exists());
    }

    // Integration tests (require audio hardware, run with: cargo test -- --ignored)

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_recorder_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(MicAuthorization::NotDetermined, dir.path()).unwrap();
        assert!(recorder.device_sample_rate > 0);
        assert!(recorder.device_channels > 0);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_recording_cycle_produces_wav() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(MicAuthorization::NotDetermined, dir.path()).unwrap();

        recorder.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        let audio = recorder.stop().unwrap();

        assert!(audio.path.exists());
        assert!(audio.size_bytes > 0);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_multiple_recording_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(MicAuthorization::NotDetermined, dir.path()).unwrap();

        for _ in 0..3 {
            recorder.start().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
            let _audio = recorder.stop().unwrap();
        }
    }
}
