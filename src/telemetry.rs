use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::logbuf::{BufferLayer, LogBuffer};

/// Initialize tracing: stderr output plus the in-memory log buffer.
///
/// The buffer layer is always installed; whether it retains anything is
/// controlled by the buffer's enabled flag (driven by config and the tray
/// toggle), so toggling logging at runtime needs no subscriber rebuild.
///
/// # Errors
/// Returns error if a global subscriber is already installed.
pub fn init(buffer: &LogBuffer) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(BufferLayer::new(buffer.clone()))
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!("telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_layer_captures_events() {
        let buffer = LogBuffer::new(16, true);

        // Scoped subscriber: avoids fighting over the global default.
        let subscriber = tracing_subscriber::registry().with(BufferLayer::new(buffer.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(samples = 42, "recording stopped");
            tracing::error!("conversion failed");
        });

        let entries = buffer.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.contains("recording stopped"));
        assert!(entries[0].message.contains("samples=42"));
        assert_eq!(entries[1].level, crate::logbuf::LogLevel::Error);
    }

    #[test]
    fn test_component_is_module_path() {
        let buffer = LogBuffer::new(16, true);
        let subscriber = tracing_subscriber::registry().with(BufferLayer::new(buffer.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "murmur::audio::capture", "started");
        });

        let entries = buffer.entries();
        assert_eq!(entries[0].component, "audio::capture");
    }
}
