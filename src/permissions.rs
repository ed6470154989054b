use anyhow::Result;

/// Microphone authorization state as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicAuthorization {
    /// User has not been asked yet; macOS prompts on first CoreAudio use.
    NotDetermined,
    /// Access granted.
    Authorized,
    /// User explicitly refused access.
    Denied,
    /// Access blocked by system policy (parental controls, MDM).
    Restricted,
}

impl MicAuthorization {
    /// Whether capture can proceed (or will trigger the system prompt).
    #[must_use]
    pub const fn allows_capture(self) -> bool {
        matches!(self, Self::Authorized | Self::NotDetermined)
    }
}

/// Determine microphone authorization.
///
/// There is no stable Rust API for querying TCC directly; macOS prompts on
/// the first CoreAudio stream open and subsequently fails stream creation
/// when access was refused. We therefore report `NotDetermined` and let the
/// capture layer map stream failures to `CaptureError::PermissionDenied`.
#[must_use]
pub fn microphone_authorization() -> MicAuthorization {
    tracing::info!("microphone permission resolved at first stream open");
    MicAuthorization::NotDetermined
}

/// Check accessibility permission, needed for simulated keystroke insertion.
///
/// # Errors
/// Returns error if accessibility permission is denied (macOS only)
pub fn check_accessibility_permission() -> Result<()> {
    tracing::info!("checking accessibility permission");

    #[cfg(target_os = "macos")]
    {
        use core_graphics::event::CGEvent;
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        let source = CGEventSource::new(CGEventSourceStateID::CombinedSessionState).map_err(
            |()| {
                anyhow::anyhow!(
                    "accessibility permission denied - enable in System Settings > Privacy & Security > Accessibility"
                )
            },
        )?;

        // Verify we can actually create events (tests full permission chain)
        CGEvent::new_keyboard_event(source, 0, true).map_err(|()| {
            anyhow::anyhow!(
                "failed to create CGEvent - enable in System Settings > Privacy & Security > Accessibility"
            )
        })?;

        tracing::info!("accessibility permission granted");
    }

    Ok(())
}

/// Startup permission pass.
///
/// Microphone access resolves lazily at first capture. Accessibility is only
/// checked when keystroke insertion is enabled, and a failure downgrades
/// delivery to clipboard-only instead of aborting; the returned flag is the
/// effective auto-insert capability.
#[must_use]
pub fn effective_auto_insert(auto_insert_requested: bool) -> bool {
    if !auto_insert_requested {
        return false;
    }

    match check_accessibility_permission() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "auto-insert disabled, falling back to clipboard-only");
            false
        }
    }
}
