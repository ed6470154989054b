use anyhow::{anyhow, Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::HotkeyConfig;

/// Application state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Idle,
    Recording,
    Processing,
}

/// What the main loop should do in response to a hotkey transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    StartRecording,
    StopRecording,
}

/// Global push-to-talk hotkey with state tracking
pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
    state: Arc<Mutex<AppState>>,
}

impl HotkeyManager {
    /// Create and register global hotkey from config
    ///
    /// # Errors
    /// Returns error if registration fails or the config names an unknown
    /// key or modifier.
    pub fn new(config: &HotkeyConfig) -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("failed to create hotkey manager")?;

        let modifiers = parse_modifiers(&config.modifiers)?;
        let code = parse_key(&config.key)?;

        let hotkey = HotKey::new(Some(modifiers), code);
        manager
            .register(hotkey)
            .context("failed to register hotkey")?;

        info!("registered hotkey: {:?} + {}", config.modifiers, config.key);

        Ok(Self {
            manager,
            hotkey,
            state: Arc::new(Mutex::new(AppState::Idle)),
        })
    }

    /// Shared handle to the state, for the tray icon.
    #[must_use]
    pub fn state_handle(&self) -> Arc<Mutex<AppState>> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, new: AppState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = new;
    }

    /// Handle hotkey press: Idle → Recording. Presses during Recording or
    /// Processing are ignored.
    fn on_press(&self) -> Option<HotkeyAction> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            AppState::Idle => {
                info!("hotkey pressed: Idle → Recording");
                *state = AppState::Recording;
                Some(HotkeyAction::StartRecording)
            }
            AppState::Recording | AppState::Processing => {
                debug!(state = ?*state, "hotkey press ignored");
                None
            }
        }
    }

    /// Handle hotkey release: Recording → Processing.
    fn on_release(&self) -> Option<HotkeyAction> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            AppState::Recording => {
                info!("hotkey released: Recording → Processing");
                *state = AppState::Processing;
                Some(HotkeyAction::StopRecording)
            }
            AppState::Idle | AppState::Processing => {
                debug!(state = ?*state, "hotkey release ignored");
                None
            }
        }
    }

    /// Pipeline finished (success or failure): Processing → Idle.
    pub fn finish_processing(&self) {
        self.set_state(AppState::Idle);
        info!("processing complete: Processing → Idle");
    }

    /// Map a global hotkey event to an action for the main loop.
    pub fn handle_event(&self, event: GlobalHotKeyEvent) -> Option<HotkeyAction> {
        if event.id != self.hotkey.id() {
            return None;
        }

        match event.state {
            global_hotkey::HotKeyState::Pressed => self.on_press(),
            global_hotkey::HotKeyState::Released => self.on_release(),
        }
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unregister(self.hotkey) {
            tracing::error!("failed to unregister hotkey: {}", e);
        }
    }
}

fn parse_modifiers(modifiers: &[String]) -> Result<Modifiers> {
    let mut result = Modifiers::empty();
    for modifier in modifiers {
        match modifier.as_str() {
            "Control" | "Ctrl" => result |= Modifiers::CONTROL,
            "Option" | "Alt" => result |= Modifiers::ALT,
            "Command" | "Super" => result |= Modifiers::SUPER,
            "Shift" => result |= Modifiers::SHIFT,
            _ => return Err(anyhow!("unknown modifier: {}", modifier)),
        }
    }
    Ok(result)
}

fn parse_key(key: &str) -> Result<Code> {
    match key {
        "A" => Ok(Code::KeyA),
        "B" => Ok(Code::KeyB),
        "C" => Ok(Code::KeyC),
        "D" => Ok(Code::KeyD),
        "E" => Ok(Code::KeyE),
        "F" => Ok(Code::KeyF),
        "G" => Ok(Code::KeyG),
        "H" => Ok(Code::KeyH),
        "I" => Ok(Code::KeyI),
        "J" => Ok(Code::KeyJ),
        "K" => Ok(Code::KeyK),
        "L" => Ok(Code::KeyL),
        "M" => Ok(Code::KeyM),
        "N" => Ok(Code::KeyN),
        "O" => Ok(Code::KeyO),
        "P" => Ok(Code::KeyP),
        "Q" => Ok(Code::KeyQ),
        "R" => Ok(Code::KeyR),
        "S" => Ok(Code::KeyS),
        "T" => Ok(Code::KeyT),
        "U" => Ok(Code::KeyU),
        "V" => Ok(Code::KeyV),
        "W" => Ok(Code::KeyW),
        "X" => Ok(Code::KeyX),
        "Y" => Ok(Code::KeyY),
        "Z" => Ok(Code::KeyZ),
        _ => Err(anyhow!("unsupported key: {}", key)),
    }
}
