//! The transcription pipeline run after each recording:
//! transcribe-with-fallback, post-process, deliver, clean up.

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::audio::AudioFile;
use crate::config::Config;
use crate::delivery::{Delivery, DeliveryOutcome};
use crate::text;
use crate::transcription::local::LocalBackend;
use crate::transcription::models::ModelLibrary;
use crate::transcription::remote::RemoteBackend;
use crate::transcription::Orchestrator;

/// Build the fallback orchestrator from the current config.
///
/// # Errors
/// Returns error if the remote HTTP client cannot be constructed.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let library = ModelLibrary::new(config.models_dir()?);
    let local = LocalBackend::new(
        config.model.recognizer.clone(),
        library.model_path(&config.model.selected),
    );
    let remote = RemoteBackend::new(config.recognition.api_key.clone())
        .map_err(|e| anyhow!("failed to build remote backend: {e}"))?;

    Ok(Orchestrator::for_mode(
        config.recognition.mode,
        Box::new(local),
        Box::new(remote),
    ))
}

/// Process one finished recording end to end. Runs on a blocking worker;
/// posts exactly one notification (success or failure) via delivery.
///
/// # Errors
/// Returns error when transcription or clipboard delivery failed; the
/// failure notification has already been posted.
pub fn process_recording(
    config: &Config,
    audio: &AudioFile,
    effective_auto_insert: bool,
) -> Result<(String, DeliveryOutcome)> {
    let delivery = Delivery::new(effective_auto_insert, config.delivery.notify);

    let result = transcribe_and_deliver(config, audio, &delivery);

    if !config.audio.keep_recordings {
        if let Err(e) = std::fs::remove_file(&audio.path) {
            warn!(error = %e, "failed to remove recording");
        }
    }

    result
}

fn transcribe_and_deliver(
    config: &Config,
    audio: &AudioFile,
    delivery: &Delivery,
) -> Result<(String, DeliveryOutcome)> {
    let orchestrator = match build_orchestrator(config) {
        Ok(o) => o,
        Err(e) => {
            delivery.deliver_failure(&e.to_string());
            return Err(e);
        }
    };

    let raw = match orchestrator.transcribe(audio, &config.recognition.language) {
        Ok(text) => text,
        Err(e) => {
            delivery.deliver_failure(&e.to_string());
            return Err(anyhow!(e));
        }
    };

    let polished = text::punctuate(&raw);
    if polished.is_empty() {
        let e = anyhow!("recognizer returned empty text");
        delivery.deliver_failure(&e.to_string());
        return Err(e);
    }

    match delivery.deliver(&polished) {
        Ok(outcome) => {
            info!(chars = polished.len(), outcome = ?outcome, "pipeline complete");
            Ok((polished, outcome))
        }
        Err(e) => {
            delivery.deliver_failure(&e.to_string());
            Err(e)
        }
    }
}
