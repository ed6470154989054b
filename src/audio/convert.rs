//! Sample-format conversion between capture output and recognizer input.

use std::path::PathBuf;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

use super::{AudioFile, AudioFormat, ConversionError};

/// Convert `input` to `target`, returning a new [`AudioFile`].
///
/// Identity fast-path: when the input already matches the target format the
/// input handle is returned unchanged and no file is written. Otherwise the
/// samples are downmixed to mono, resampled by linear interpolation and
/// written as 16-bit PCM to a temp WAV whose ownership passes to the caller.
/// The temp file is removed on failure, never on success.
///
/// # Errors
/// Returns `NoAudioTrack` for a sample-less input, `ConversionFailed` for
/// read/write failures.
pub fn convert(input: &AudioFile, target: AudioFormat) -> Result<AudioFile, ConversionError> {
    if input.format == target {
        debug!(path = %input.path.display(), "conversion fast-path: format already matches");
        return Ok(input.clone());
    }

    let samples = read_samples(input)?;
    if samples.is_empty() {
        return Err(ConversionError::NoAudioTrack);
    }

    let mono = downmix_to_mono(&samples, input.format.channels);
    let resampled = resample_linear(&mono, input.format.sample_rate, target.sample_rate);

    let out_path = temp_output_path(input);
    match write_pcm16(&resampled, target, &out_path) {
        Ok(size_bytes) => {
            info!(
                from_rate = input.format.sample_rate,
                to_rate = target.sample_rate,
                from_channels = input.format.channels,
                output = %out_path.display(),
                "audio converted"
            );
            Ok(AudioFile {
                path: out_path,
                format: target,
                size_bytes,
            })
        }
        Err(e) => {
            // Partial output is useless to every caller.
            let _ = std::fs::remove_file(&out_path);
            Err(e)
        }
    }
}

fn temp_output_path(input: &AudioFile) -> PathBuf {
    let stem = input
        .path
        .file_stem()
        .map_or_else(|| "recording".to_owned(), |s| s.to_string_lossy().into_owned());
    std::env::temp_dir().join(format!("murmur_{}_{}_16k.wav", std::process::id(), stem))
}

/// Read all samples from the input WAV, normalized to f32 in [-1, 1].
fn read_samples(input: &AudioFile) -> Result<Vec<f32>, ConversionError> {
    let reader = hound::WavReader::open(&input.path)
        .map_err(|e| ConversionError::ConversionFailed(format!("failed to open WAV: {e}")))?;

    let spec = reader.spec();
    match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConversionError::ConversionFailed(format!("failed to read samples: {e}"))),
        SampleFormat::Int => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / f32::from(i16::MAX)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConversionError::ConversionFailed(format!("failed to read samples: {e}"))),
    }
}

/// Average interleaved frames down to a single channel.
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 → f32: audio samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum_f64 / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampling.
// Algorithm requires f64 ↔ usize conversions for fractional index calculations
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);

    // Output length - ratio is always positive for valid sample rates
    let output_len_f64 = (samples.len() as f64) / ratio;
    let output_len = if output_len_f64.is_finite() && output_len_f64 >= 0.0 {
        output_len_f64.ceil() as usize
    } else {
        samples.len()
    };

    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx_f64 = (i as f64) * ratio;

        // Floor gives integer part, safe because src_idx >= 0
        let src_idx_floor = if src_idx_f64 >= 0.0 && src_idx_f64 < (usize::MAX as f64) {
            src_idx_f64.floor() as usize
        } else {
            0
        };

        let src_idx_ceil = (src_idx_floor + 1).min(samples.len().saturating_sub(1));
        let fract = src_idx_f64 - src_idx_f64.floor();

        let sample = if src_idx_floor < samples.len() {
            let s1 = f64::from(samples[src_idx_floor]);
            let s2 = f64::from(samples[src_idx_ceil]);
            // Use mul_add for better precision
            s1.mul_add(1.0 - fract, s2 * fract) as f32
        } else {
            0.0_f32
        };

        resampled.push(sample);
    }

    resampled
}

/// Write f32 samples as 16-bit PCM at the target rate, returning the size.
fn write_pcm16(
    samples: &[f32],
    target: AudioFormat,
    path: &std::path::Path,
) -> Result<u64, ConversionError> {
    let spec = WavSpec {
        channels: target.channels,
        sample_rate: target.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| ConversionError::ConversionFailed(format!("failed to create WAV: {e}")))?;

    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)] // Clamped before the cast
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(value)
            .map_err(|e| ConversionError::ConversionFailed(format!("failed to write sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| ConversionError::ConversionFailed(format!("failed to finalize WAV: {e}")))?;

    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ConversionError::ConversionFailed(format!("failed to stat WAV: {e}")))
}
