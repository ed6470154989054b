//! Input handling: global hotkey and simulated keystrokes.

pub mod cgevent;
pub mod hotkey;
