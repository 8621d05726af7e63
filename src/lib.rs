//! Tray utility for the Windows HDR "SDR content brightness" setting.
//!
//! The state machine ([`app`]), configuration, scheduling, wheel routing and
//! layout maths are platform independent and unit tested anywhere. The
//! Win32 surface (tray, popup, hotkey, autostart, message loop) is compiled
//! on Windows only.

pub mod app;
pub mod brightness;
pub mod config;
pub mod error;
pub mod geometry;
pub mod icon;
pub mod input;
pub mod logging;
pub mod schedule;
pub mod ui;
pub mod updater;

#[cfg(windows)]
pub mod autostart;
#[cfg(windows)]
pub mod controller;
#[cfg(windows)]
pub mod hotkeys;
#[cfg(windows)]
pub mod tray;
