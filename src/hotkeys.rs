// Global hotkey using Win32 RegisterHotKey API

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT, MOD_NOREPEAT, MOD_WIN,
};

/// Hotkey ID (must be unique within the application)
pub const HOTKEY_OPEN_SLIDER: i32 = 1;

const VK_S: u32 = 0x53;

/// Register Win+Alt+S → open the slider.
pub fn register(hwnd: HWND) -> windows::core::Result<()> {
    let mods = HOT_KEY_MODIFIERS(MOD_WIN.0 | MOD_ALT.0 | MOD_NOREPEAT.0);
    let result = unsafe { RegisterHotKey(Some(hwnd), HOTKEY_OPEN_SLIDER, mods, VK_S) };
    match &result {
        Ok(()) => tracing::info!("hotkey registered Win+Alt+S"),
        Err(e) => tracing::warn!(error = %e, "hotkey register-failed"),
    }
    result
}

pub fn unregister(hwnd: HWND) {
    unsafe {
        let _ = UnregisterHotKey(Some(hwnd), HOTKEY_OPEN_SLIDER);
    }
}
