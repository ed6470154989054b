//! murmur - macOS menu-bar voice transcription.
//!
//! Hold the hotkey to record, release to transcribe (locally via whisper-cli
//! or through the cloud API, with fallback) and get the text on the
//! clipboard.

use std::sync::mpsc;

use anyhow::{Context, Result};
use global_hotkey::GlobalHotKeyEvent;
use tracing::{error, info, warn};

use murmur::audio::capture::Recorder;
use murmur::config::Config;
use murmur::input::hotkey::{HotkeyAction, HotkeyManager};
use murmur::logbuf::LogBuffer;
use murmur::transcription::models::{DownloadTracker, ModelLibrary};
use murmur::tray::{TrayCommand, TrayManager};
use murmur::{permissions, pipeline, telemetry};

/// Result of one pipeline run, marshalled back to the main loop.
type PipelineResult = Result<String, String>;

/// Completed model download, marshalled back to the main loop.
type DownloadResult = (String, Result<(), String>);

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load()?;

    let log_buffer = LogBuffer::new(config.logging.max_entries, config.logging.enabled);
    telemetry::init(&log_buffer)?;
    info!("murmur starting");

    let auto_insert = permissions::effective_auto_insert(config.delivery.auto_insert);

    let library = ModelLibrary::new(config.models_dir()?);
    let mut downloads = DownloadTracker::new();

    let mut recorder = Recorder::new(
        permissions::microphone_authorization(),
        &config.recordings_dir()?,
    )
    .context("failed to initialize audio capture")?;

    let hotkey_manager = HotkeyManager::new(&config.hotkey)?;
    let mut tray = TrayManager::new(&config, &library, &downloads, hotkey_manager.state_handle())?;

    let (result_tx, result_rx) = mpsc::channel::<PipelineResult>();
    let (download_tx, download_rx) = mpsc::channel::<DownloadResult>();

    info!("event loop starting");
    let hotkey_receiver = GlobalHotKeyEvent::receiver();

    loop {
        // Hotkey press/release drives the push-to-talk state machine
        if let Ok(event) = hotkey_receiver.try_recv() {
            match hotkey_manager.handle_event(event) {
                Some(HotkeyAction::StartRecording) => {
                    if let Err(e) = recorder.start() {
                        error!(error = %e, "failed to start recording");
                        hotkey_manager.finish_processing();
                    }
                }
                Some(HotkeyAction::StopRecording) => match recorder.stop() {
                    Ok(audio_file) => {
                        let config_snapshot = config.clone();
                        let tx = result_tx.clone();
                        tokio::task::spawn_blocking(move || {
                            let result = pipeline::process_recording(
                                &config_snapshot,
                                &audio_file,
                                auto_insert,
                            )
                            .map(|(text, _)| text)
                            .map_err(|e| e.to_string());
                            let _ = tx.send(result);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to stop recording");
                        hotkey_manager.finish_processing();
                    }
                },
                None => {}
            }
        }

        // Pipeline completion returns the app to Idle
        if let Ok(result) = result_rx.try_recv() {
            match result {
                Ok(text) => info!(chars = text.len(), "transcription delivered"),
                Err(e) => warn!(error = %e, "transcription failed"),
            }
            hotkey_manager.finish_processing();
        }

        // Finished downloads release the in-flight guard and update the menu
        if let Ok((filename, result)) = download_rx.try_recv() {
            match result {
                Ok(()) => info!(model = %filename, "model download finished"),
                Err(e) => error!(model = %filename, error = %e, "model download failed"),
            }
            downloads.finish(&filename);
            if let Err(e) = tray.update_menu(&config, &library, &downloads) {
                warn!(error = %e, "failed to refresh tray menu");
            }
        }

        // Tray menu commands
        if let Some(command) = TrayManager::poll_events() {
            if let Err(e) = handle_tray_command(
                command,
                &mut config,
                &library,
                &log_buffer,
                &tray,
                &mut downloads,
                &download_tx,
            ) {
                error!(error = %e, "failed to handle tray command");
            }
        }

        if let Err(e) = tray.update_icon_if_needed(&config, &library, &downloads) {
            warn!(error = %e, "failed to update tray icon");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            () = tokio::time::sleep(tokio::time::Duration::from_millis(10)) => {
                // Poll interval (10ms to avoid busy-waiting)
            }
        }
    }

    Ok(())
}

fn handle_tray_command(
    command: TrayCommand,
    config: &mut Config,
    library: &ModelLibrary,
    log_buffer: &LogBuffer,
    tray: &TrayManager,
    downloads: &mut DownloadTracker,
    download_tx: &mpsc::Sender<DownloadResult>,
) -> Result<()> {
    match command {
        TrayCommand::SelectModel(filename) => {
            info!(model = %filename, "model selected");
            config.model.selected = filename;
            config.save()?;
            tray.update_menu(config, library, downloads)?;
        }
        TrayCommand::DownloadModel(filename) => {
            let models_dir = config.models_dir()?;
            // One writer per .part file; duplicate requests are dropped
            if !downloads.begin(&filename) {
                warn!(model = %filename, "download already in progress, ignoring");
                return Ok(());
            }
            let tx = download_tx.clone();
            tokio::task::spawn_blocking(move || {
                let library = ModelLibrary::new(models_dir);
                let mut last_reported = 0_u32;
                let result = library
                    .download(&filename, &mut |fraction| {
                        // Log every 10% step
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let decile = (fraction * 10.0) as u32;
                        if decile > last_reported {
                            last_reported = decile;
                            info!(model = %filename, percent = decile * 10, "downloading");
                        }
                    })
                    .map(|_| ())
                    .map_err(|e| e.to_string());
                let _ = tx.send((filename, result));
            });
            // Show the disabled "Downloading..." entry right away
            tray.update_menu(config, library, downloads)?;
        }
        TrayCommand::DeleteModel(filename) => {
            if let Some(replacement) = library.delete(&filename, &config.model.selected)? {
                info!(model = %replacement, "selection moved after delete");
                config.model.selected = replacement;
                config.save()?;
            }
            tray.update_menu(config, library, downloads)?;
        }
        TrayCommand::SetMode(mode) => {
            info!(mode = ?mode, "recognition mode changed");
            config.recognition.mode = mode;
            config.save()?;
            tray.update_menu(config, library, downloads)?;
        }
        TrayCommand::SetLanguage(code) => {
            info!(language = %code, "language changed");
            config.recognition.language = code;
            config.save()?;
            tray.update_menu(config, library, downloads)?;
        }
        TrayCommand::ToggleLogging => {
            config.logging.enabled = !config.logging.enabled;
            log_buffer.set_enabled(config.logging.enabled);
            info!(enabled = config.logging.enabled, "logging toggled");
            config.save()?;
            tray.update_menu(config, library, downloads)?;
        }
        TrayCommand::ExportLogs => {
            let dir = export_dir()?;
            let path = log_buffer.export_to_file(&dir)?;
            info!(path = %path.display(), "logs exported");
        }
        TrayCommand::OpenConfigFile => {
            let path = Config::config_path()?;
            std::process::Command::new("open")
                .arg(&path)
                .spawn()
                .context("failed to open config file")?;
        }
    }
    Ok(())
}

/// Log exports land on the Desktop when it exists, else in the home dir.
fn export_dir() -> Result<std::path::PathBuf> {
    let desktop = Config::expand_path("~/Desktop")?;
    if desktop.is_dir() {
        Ok(desktop)
    } else {
        Config::expand_path("~/")
    }
}
