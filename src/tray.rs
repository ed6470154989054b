use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tray_icon::menu::{CheckMenuItem, Menu, MenuItem, PredefinedMenuItem, Submenu};
use tray_icon::{Icon, TrayIconBuilder};

use crate::config::{Config, RecognitionMode};
use crate::input::hotkey::AppState;
use crate::transcription::models::{DownloadTracker, ModelLibrary, CATALOG};

/// Menu actions handled by the main loop.
#[derive(Debug, Clone)]
pub enum TrayCommand {
    SelectModel(String),
    DownloadModel(String),
    DeleteModel(String),
    SetMode(RecognitionMode),
    SetLanguage(String),
    ToggleLogging,
    ExportLogs,
    OpenConfigFile,
    // Note: Quit not here - PredefinedMenuItem::quit() bypasses the event system
}

const LANGUAGES: [(&str, &str); 6] = [
    ("English", "en"),
    ("Russian", "ru"),
    ("Polish", "pl"),
    ("Spanish", "es"),
    ("French", "fr"),
    ("German", "de"),
];

pub struct TrayManager {
    tray: tray_icon::TrayIcon,
    state: Arc<Mutex<AppState>>,
    current_icon_state: AppState,
    cached_icons: HashMap<AppState, Icon>,
}

impl TrayManager {
    /// # Errors
    /// Returns error if the tray icon cannot be built.
    pub fn new(
        config: &Config,
        library: &ModelLibrary,
        downloads: &DownloadTracker,
        state: Arc<Mutex<AppState>>,
    ) -> Result<Self> {
        // Pre-render all three state icons
        let mut cached_icons = HashMap::new();
        cached_icons.insert(AppState::Idle, render_icon(AppState::Idle)?);
        cached_icons.insert(AppState::Recording, render_icon(AppState::Recording)?);
        cached_icons.insert(AppState::Processing, render_icon(AppState::Processing)?);

        let tray = Self::build_tray(config, library, downloads, AppState::Idle, &cached_icons)?;

        Ok(Self {
            tray,
            state,
            current_icon_state: AppState::Idle,
            cached_icons,
        })
    }

    fn build_tray(
        config: &Config,
        library: &ModelLibrary,
        downloads: &DownloadTracker,
        app_state: AppState,
        cached_icons: &HashMap<AppState, Icon>,
    ) -> Result<tray_icon::TrayIcon> {
        let icon = cached_icons
            .get(&app_state)
            .with_context(|| format!("icon for state {app_state:?} not in cache"))?
            .clone();
        let menu = Self::build_menu(config, library, downloads, Some(app_state))?;

        TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("murmur")
            .with_icon(icon)
            .build()
            .context("failed to build tray icon")
    }

    /// Rebuild the tray when the app state changed since the last poll.
    ///
    /// # Errors
    /// Returns error if the rebuilt tray cannot be constructed.
    pub fn update_icon_if_needed(
        &mut self,
        config: &Config,
        library: &ModelLibrary,
        downloads: &DownloadTracker,
    ) -> Result<()> {
        let new_state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if new_state != self.current_icon_state {
            tracing::debug!(from = ?self.current_icon_state, to = ?new_state, "tray state change");

            // Rebuild the whole tray (workaround for macOS set_icon() bug)
            self.tray = Self::build_tray(config, library, downloads, new_state, &self.cached_icons)?;
            self.current_icon_state = new_state;
        }
        Ok(())
    }

    /// Rebuild the menu after a config or model-library change.
    ///
    /// # Errors
    /// Returns error if the menu cannot be constructed.
    pub fn update_menu(
        &self,
        config: &Config,
        library: &ModelLibrary,
        downloads: &DownloadTracker,
    ) -> Result<()> {
        let current_state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let new_menu = Self::build_menu(config, library, downloads, Some(current_state))?;
        self.tray.set_menu(Some(Box::new(new_menu)));
        Ok(())
    }

    fn get_status_text(app_state: Option<AppState>) -> &'static str {
        app_state.map_or("murmur", |state| match state {
            AppState::Idle => "murmur - Ready",
            AppState::Recording => "Recording...",
            AppState::Processing => "Transcribing...",
        })
    }

    fn build_menu(
        config: &Config,
        library: &ModelLibrary,
        downloads: &DownloadTracker,
        app_state: Option<AppState>,
    ) -> Result<Menu> {
        let menu = Menu::new();

        // Status item showing current state (non-clickable)
        let status = MenuItem::new(Self::get_status_text(app_state), false, None);
        menu.append(&status)
            .context("failed to append status item")?;
        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;

        // Model submenu: selectable installed models, download items for the
        // rest, and a delete submenu for what is on disk.
        let model_submenu = Submenu::new("Model", true);
        for model in &CATALOG {
            let installed = library.is_installed(model.filename);
            let selected = config.model.selected == model.filename;

            // Disabled while a download is in flight; the id never fires.
            let (id, label, enabled) = if downloads.is_downloading(model.filename) {
                (
                    format!("model:downloading:{}", model.filename),
                    format!("Downloading {}...", model.display_name),
                    false,
                )
            } else if installed {
                let marker = if selected { "\u{2713} " } else { "" };
                (
                    format!("model:select:{}", model.filename),
                    format!("{marker}{} ({})", model.display_name, model.size_label()),
                    true,
                )
            } else {
                let hint = if model.recommended { ", recommended" } else { "" };
                (
                    format!("model:download:{}", model.filename),
                    format!(
                        "Download {} ({}{hint})",
                        model.display_name,
                        model.size_label()
                    ),
                    true,
                )
            };
            let item = MenuItem::with_id(id, &label, enabled, None);
            model_submenu
                .append(&item)
                .context("failed to append model item")?;
        }

        let installed = library.installed_models();
        if !installed.is_empty() {
            model_submenu
                .append(&PredefinedMenuItem::separator())
                .context("failed to append separator")?;
            let delete_submenu = Submenu::new("Delete", true);
            for model in installed {
                let item = MenuItem::with_id(
                    format!("model:delete:{}", model.filename),
                    format!("Delete {}", model.display_name),
                    true,
                    None,
                );
                delete_submenu
                    .append(&item)
                    .context("failed to append delete item")?;
            }
            model_submenu
                .append(&delete_submenu)
                .context("failed to append delete submenu")?;
        }
        menu.append(&model_submenu)
            .context("failed to append model submenu")?;

        // Mode submenu, entries disabled when the backend cannot run
        let local_available = !library.installed_models().is_empty();
        let remote_available = !config.recognition.api_key.is_empty();

        let mode_submenu = Submenu::new("Mode", true);
        let modes = [
            (RecognitionMode::Local, "mode:local", local_available),
            (RecognitionMode::Remote, "mode:remote", remote_available),
            (
                RecognitionMode::Auto,
                "mode:auto",
                local_available || remote_available,
            ),
        ];
        for (mode, id, available) in modes {
            let marker = if config.recognition.mode == mode {
                "\u{2713} "
            } else {
                ""
            };
            let item = MenuItem::with_id(
                id,
                format!("{marker}{}", mode.display_name()),
                available,
                None,
            );
            mode_submenu
                .append(&item)
                .context("failed to append mode item")?;
        }
        menu.append(&mode_submenu)
            .context("failed to append mode submenu")?;

        // Language submenu
        let lang_submenu = Submenu::new("Language", true);
        for (label, code) in LANGUAGES {
            let marker = if config.recognition.language == code {
                "\u{2713} "
            } else {
                ""
            };
            let item = MenuItem::with_id(format!("lang:{code}"), format!("{marker}{label}"), true, None);
            lang_submenu
                .append(&item)
                .context("failed to append language item")?;
        }
        menu.append(&lang_submenu)
            .context("failed to append language submenu")?;

        // Toggles and actions
        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;

        let logging =
            CheckMenuItem::with_id("logging:toggle", "Logging", true, config.logging.enabled, None);
        menu.append(&logging)
            .context("failed to append logging item")?;

        let export = MenuItem::with_id("logs:export", "Export Logs", true, None);
        menu.append(&export)
            .context("failed to append export item")?;

        let open_config = MenuItem::with_id("config:open", "Open Config File", true, None);
        menu.append(&open_config)
            .context("failed to append open config item")?;

        menu.append(&PredefinedMenuItem::quit(None))
            .context("failed to append quit item")?;

        Ok(menu)
    }

    /// Poll the menu event channel without blocking.
    pub fn poll_events() -> Option<TrayCommand> {
        use tray_icon::menu::MenuEvent;

        if let Ok(event) = MenuEvent::receiver().try_recv() {
            let id = event.id.0.as_str();
            tracing::debug!("tray menu event received: id={:?}", id);
            return Self::parse_menu_event(id);
        }

        None
    }

    fn parse_menu_event(id: &str) -> Option<TrayCommand> {
        if let Some(rest) = id.strip_prefix("model:") {
            let (action, filename) = rest.split_once(':')?;
            return match action {
                "select" => Some(TrayCommand::SelectModel(filename.to_owned())),
                "download" => Some(TrayCommand::DownloadModel(filename.to_owned())),
                "delete" => Some(TrayCommand::DeleteModel(filename.to_owned())),
                _ => None,
            };
        }

        if let Some(mode) = id.strip_prefix("mode:") {
            return match mode {
                "local" => Some(TrayCommand::SetMode(RecognitionMode::Local)),
                "remote" => Some(TrayCommand::SetMode(RecognitionMode::Remote)),
                "auto" => Some(TrayCommand::SetMode(RecognitionMode::Auto)),
                _ => None,
            };
        }

        if let Some(code) = id.strip_prefix("lang:") {
            return LANGUAGES
                .iter()
                .find(|(_, c)| *c == code)
                .map(|(_, c)| TrayCommand::SetLanguage((*c).to_owned()));
        }

        match id {
            "logging:toggle" => Some(TrayCommand::ToggleLogging),
            "logs:export" => Some(TrayCommand::ExportLogs),
            "config:open" => Some(TrayCommand::OpenConfigFile),
            _ => None,
        }
    }
}

/// Render a 32x32 filled-circle status icon: gray when idle, red while
/// recording, amber while transcribing.
fn render_icon(state: AppState) -> Result<Icon> {
    const SIZE: u32 = 32;
    let (r, g, b) = match state {
        AppState::Idle => (128_u8, 128_u8, 128_u8),
        AppState::Recording => (220, 60, 60),
        AppState::Processing => (230, 170, 50),
    };

    let center = f64::from(SIZE) / 2.0;
    let radius = center - 2.0;

    let mut rgba = Vec::with_capacity((SIZE * SIZE * 4) as usize);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let dx = f64::from(x) + 0.5 - center;
            let dy = f64::from(y) + 0.5 - center;
            let inside = dx.hypot(dy) <= radius;
            rgba.extend_from_slice(&[r, g, b, if inside { 255 } else { 0 }]);
        }
    }

    Icon::from_rgba(rgba, SIZE, SIZE).context("failed to create icon from RGBA data")
}
