//! Getting recognized text to the user: clipboard, optional keystroke
//! insertion, and a completion notification.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::input::cgevent;

const NOTIFICATION_TITLE: &str = "murmur";

/// How the text reached the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Clipboard plus simulated keystrokes into the frontmost app.
    Inserted,
    /// Clipboard only; the user pastes manually.
    CopiedOnly,
}

/// Delivers finished transcriptions.
pub struct Delivery {
    /// Effective auto-insert capability (requested and permitted).
    auto_insert: bool,
    notify: bool,
}

impl Delivery {
    #[must_use]
    pub const fn new(auto_insert: bool, notify: bool) -> Self {
        Self {
            auto_insert,
            notify,
        }
    }

    /// Deliver `text`: always copy to the clipboard, then optionally attempt
    /// keystroke insertion. Insertion failure only changes the notification
    /// wording. Posts exactly one notification per call.
    ///
    /// # Errors
    /// Returns error when the clipboard write fails; the caller surfaces
    /// that as an error notification.
    pub fn deliver(&self, text: &str) -> Result<DeliveryOutcome> {
        let mut clipboard = arboard::Clipboard::new().context("failed to open clipboard")?;
        clipboard
            .set_text(text.to_owned())
            .context("failed to write text to clipboard")?;
        info!(chars = text.len(), "text copied to clipboard");

        let outcome = if self.auto_insert && cgevent::insert_text_safe(text) {
            DeliveryOutcome::Inserted
        } else {
            DeliveryOutcome::CopiedOnly
        };

        let preview = cgevent::generate_text_preview(text);
        let message = match outcome {
            DeliveryOutcome::Inserted => format!("Inserted: {preview}"),
            DeliveryOutcome::CopiedOnly => format!("Copied, paste manually: {preview}"),
        };
        self.post(&message);

        Ok(outcome)
    }

    /// Post a failure notification with a human-readable message.
    pub fn deliver_failure(&self, message: &str) {
        self.post(&format!("Transcription failed: {message}"));
    }

    fn post(&self, message: &str) {
        if !self.notify {
            return;
        }
        if let Err(e) = post_notification(NOTIFICATION_TITLE, message) {
            warn!(error = %e, "failed to post notification");
        }
    }
}

/// Post a Notification Center banner via `osascript`.
fn post_notification(title: &str, message: &str) -> Result<()> {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript(message),
        escape_applescript(title)
    );

    let status = std::process::Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .status()
        .context("failed to run osascript")?;

    if !status.success() {
        anyhow::bail!("osascript exited with {status}");
    }
    Ok(())
}

/// Escape a string for embedding in a double-quoted AppleScript literal.
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
