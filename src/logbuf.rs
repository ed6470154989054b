//! In-memory log buffer.
//!
//! Keeps the most recent log entries in a capped ring buffer so the tray can
//! offer a log export without the user hunting for a file. Fed by a
//! `tracing_subscriber` layer installed in [`crate::telemetry`].

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context as _, Result};
use jiff::Zoned;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Default cap on retained entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Upper-case label used in exports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::INFO => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// A single structured log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Wall-clock time the entry was recorded.
    pub timestamp: Zoned,
    /// Severity.
    pub level: LogLevel,
    /// Originating component (module path, crate prefix stripped).
    pub component: String,
    /// Rendered message.
    pub message: String,
}

impl LogEntry {
    /// Render as a single export line: `[timestamp] [LEVEL] [component] message`.
    #[must_use]
    pub fn formatted(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.strftime("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.label(),
            self.component,
            self.message
        )
    }
}

struct Inner {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    enabled: bool,
}

/// Shared, capped ring buffer of log entries. Cheap to clone.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl LogBuffer {
    /// Create a buffer retaining at most `max_entries` entries.
    #[must_use]
    pub fn new(max_entries: usize, enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::with_capacity(max_entries.min(1024)),
                max_entries,
                enabled,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, evicting the oldest once the cap is exceeded.
    pub fn push(&self, entry: LogEntry) {
        let mut inner = self.lock();
        if !inner.enabled {
            return;
        }
        inner.entries.push_back(entry);
        while inner.entries.len() > inner.max_entries {
            inner.entries.pop_front();
        }
    }

    /// Snapshot of the retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop all retained entries.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Enable or disable collection. Disabling does not drop existing entries.
    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    /// Whether collection is currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Change the retention cap, evicting oldest entries if needed.
    pub fn set_max_entries(&self, max_entries: usize) {
        let mut inner = self.lock();
        inner.max_entries = max_entries;
        while inner.entries.len() > inner.max_entries {
            inner.entries.pop_front();
        }
    }

    /// Render the full export: header block followed by one line per entry.
    #[must_use]
    pub fn export(&self) -> String {
        let entries = self.entries();
        let mut out = String::new();
        let _ = writeln!(out, "========================================");
        let _ = writeln!(out, "murmur log export");
        let _ = writeln!(
            out,
            "Generated: {}",
            Zoned::now().strftime("%Y-%m-%d %H:%M:%S%.3f")
        );
        let _ = writeln!(out, "Total entries: {}", entries.len());
        let _ = writeln!(out, "========================================");
        out.push('\n');
        for entry in &entries {
            let _ = writeln!(out, "{}", entry.formatted());
        }
        out
    }

    /// Write the export to a timestamped file under `dir`, returning its path.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the file written.
    pub fn export_to_file(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).context("failed to create log export directory")?;
        let filename = format!(
            "murmur_logs_{}.txt",
            Zoned::now().strftime("%Y-%m-%d_%H-%M-%S")
        );
        let path = dir.join(filename);
        std::fs::write(&path, self.export()).context("failed to write log export")?;
        tracing::info!(path = %path.display(), "logs exported");
        Ok(path)
    }
}

/// `tracing_subscriber` layer that mirrors events into a [`LogBuffer`].
pub struct BufferLayer {
    buffer: LogBuffer,
}

impl BufferLayer {
    /// Create a layer feeding `buffer`.
    #[must_use]
    pub const fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

/// Extracts the `message` field from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .push((field.name().to_owned(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.fields.push((field.name().to_owned(), value.to_owned()));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message;
        for (name, value) in visitor.fields {
            let _ = write!(message, " {name}={value}");
        }

        let component = event
            .metadata()
            .target()
            .strip_prefix("murmur::")
            .unwrap_or_else(|| event.metadata().target())
            .to_owned();

        self.buffer.push(LogEntry {
            timestamp: Zoned::now(),
            level: event.metadata().level().into(),
            component,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(msg: &str) -> LogEntry {
        LogEntry {
            timestamp: Zoned::now(),
            level: LogLevel::Info,
            component: "test".to_owned(),
            message: msg.to_owned(),
        }
    }

    #[test]
    fn test_fifo_eviction_at_cap() {
        let buffer = LogBuffer::new(5, true);
        for i in 0..8 {
            buffer.push(entry(&format!("entry {i}")));
        }

        let entries = buffer.entries();
        assert_eq!(entries.len(), 5);
        // Oldest three evicted; most recent five retained in order.
        assert_eq!(entries[0].message, "entry 3");
        assert_eq!(entries[4].message, "entry 7");
    }

    #[test]
    fn test_disabled_buffer_drops_entries() {
        let buffer = LogBuffer::new(10, false);
        buffer.push(entry("ignored"));
        assert!(buffer.is_empty());

        buffer.set_enabled(true);
        buffer.push(entry("kept"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_shrinking_cap_evicts_oldest() {
        let buffer = LogBuffer::new(10, true);
        for i in 0..10 {
            buffer.push(entry(&format!("entry {i}")));
        }
        buffer.set_max_entries(3);

        let entries = buffer.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "entry 7");
    }

    #[test]
    fn test_export_header_and_lines() {
        let buffer = LogBuffer::new(10, true);
        buffer.push(entry("first"));
        buffer.push(LogEntry {
            timestamp: Zoned::now(),
            level: LogLevel::Error,
            component: "capture".to_owned(),
            message: "boom".to_owned(),
        });

        let export = buffer.export();
        assert!(export.contains("Total entries: 2"));
        assert!(export.contains("[INFO] [test] first"));
        assert!(export.contains("[ERROR] [capture] boom"));
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = LogBuffer::new(10, true);
        buffer.push(entry("persisted"));

        let path = buffer.export_to_file(dir.path()).unwrap();
        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("persisted"));
    }

    #[test]
    fn test_formatted_entry_shape() {
        let line = entry("hello").formatted();
        assert!(line.contains("[INFO] [test] hello"));
        assert!(line.starts_with('['));
    }

    #[test]
    fn test_clear() {
        let buffer = LogBuffer::new(10, true);
        buffer.push(entry("gone"));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
