//! murmur - macOS menu-bar voice transcription.
//!
//! This library exports the core modules for testing and reuse; the binary
//! wires them into the tray event loop.

/// Audio capture and conversion
pub mod audio;
/// Configuration management
pub mod config;
/// Clipboard, keystroke insertion and notifications
pub mod delivery;
/// Input handling (hotkeys, text insertion)
pub mod input;
/// In-memory log buffer and export
pub mod logbuf;
/// macOS permission checks
pub mod permissions;
/// End-to-end transcription pipeline
pub mod pipeline;
/// Tracing setup
pub mod telemetry;
/// Text post-processing
pub mod text;
/// Recognition backends and fallback orchestration
pub mod transcription;
/// Menu-bar icon and menu
pub mod tray;
