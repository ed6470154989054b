use core_graphics::event::{CGEvent, CGEventTapLocation};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use thiserror::Error;
use tracing::{debug, error, info};

/// Truncate text for log lines and notifications (>50 chars get "...").
/// Respects UTF-8 char boundaries.
#[must_use]
pub fn generate_text_preview(text: &str) -> String {
    if text.len() > 50 {
        let mut end = 47.min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            return "...".to_owned();
        }
        format!("{}...", &text[..end])
    } else {
        text.to_owned()
    }
}

/// Text insertion errors
#[derive(Debug, Error)]
pub enum TextInsertionError {
    /// Failed to create `CGEvent` source
    #[error("failed to create CGEvent source")]
    EventSourceCreation,

    /// Failed to create keyboard `CGEvent`
    #[error("failed to create keyboard CGEvent")]
    EventCreation,

    /// Text is empty
    #[error("text is empty")]
    EmptyText,
}

/// Insert text at the current cursor position via a synthetic keyboard event.
///
/// Uses `CGEventKeyboardSetUnicodeString` under the hood. Requires the
/// accessibility permission checked at startup; `event.post()` itself cannot
/// report failure, and some apps (secure input fields) swallow the event, so
/// callers treat this as best-effort.
///
/// # Errors
/// Returns error if `CGEvent` creation fails or text is empty.
pub fn insert_text(text: &str) -> Result<(), TextInsertionError> {
    if text.is_empty() {
        return Err(TextInsertionError::EmptyText);
    }

    debug!(
        text_len = text.len(),
        preview = %generate_text_preview(text),
        "inserting text via CGEvent"
    );

    let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|()| {
        error!("CGEventSource creation failed - accessibility permission may have been revoked");
        TextInsertionError::EventSourceCreation
    })?;

    // Dummy keycode; the unicode string below overrides it
    let event = CGEvent::new_keyboard_event(source, 0, true)
        .map_err(|()| TextInsertionError::EventCreation)?;

    // encode_utf16() on &str always yields valid UTF-16, which is what
    // set_string_from_utf16_unchecked requires.
    let utf16: Vec<u16> = text.encode_utf16().collect();
    event.set_string_from_utf16_unchecked(&utf16);

    event.post(CGEventTapLocation::HID);

    info!(text_len = text.len(), "CGEvent posted");
    Ok(())
}

/// Best-effort insertion: logs failures and reports success as a bool.
pub fn insert_text_safe(text: &str) -> bool {
    match insert_text(text) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, text_len = text.len(), "text insertion failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_text_preview_short() {
        assert_eq!(generate_text_preview("hello"), "hello");
        assert_eq!(generate_text_preview(""), "");
        let text_50 = "a".repeat(50);
        assert_eq!(generate_text_preview(&text_50), text_50);
    }

    #[test]
    fn test_generate_text_preview_long() {
        let text_100 = "a".repeat(100);
        let preview = generate_text_preview(&text_100);
        assert!(preview.len() <= 50);
        assert!(preview.ends_with("..."));
        assert!(preview.starts_with(&text_100[..preview.len() - 3]));
    }

    #[test]
    fn test_generate_text_preview_unicode_boundary() {
        // 4-byte emojis force the truncation point off byte 47
        let long_unicode = "\u{1F44B}".repeat(30);
        let preview = generate_text_preview(&long_unicode);
        assert!(preview.ends_with("..."));
        assert!(preview.len() < long_unicode.len());
    }

    #[test]
    fn test_insert_text_empty() {
        assert!(matches!(insert_text(""), Err(TextInsertionError::EmptyText)));
        assert!(!insert_text_safe(""));
    }

    #[test]
    #[ignore = "requires accessibility permissions and an active cursor"]
    fn test_insert_text_simple() {
        assert!(insert_text("hello").is_ok());
    }

    #[test]
    #[ignore = "requires accessibility permissions and an active cursor"]
    fn test_insert_text_unicode() {
        assert!(insert_text("Hello \u{1F44B} \u{15A}wiat").is_ok());
    }
}
