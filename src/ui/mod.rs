pub mod controls;
pub mod theme;

#[cfg(windows)]
pub mod painting;
#[cfg(windows)]
pub mod popup;
#[cfg(windows)]
pub mod schedule_dialog;

/// NUL-terminated UTF-16 for Win32 string parameters.
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
pub use self::win::apply_window_theme;

#[cfg(windows)]
mod win {
    use std::ffi::c_void;

    use windows::core::BOOL;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Dwm::{
        DwmSetWindowAttribute, DWMWA_USE_IMMERSIVE_DARK_MODE, DWMWA_WINDOW_CORNER_PREFERENCE,
        DWMWCP_ROUND,
    };

    use crate::config::Theme;

    /// Rounded corners and the dark-mode frame hint. Both are best effort:
    /// older Windows builds reject the attributes.
    pub fn apply_window_theme(hwnd: HWND, theme: Theme) {
        let corner = DWMWCP_ROUND;
        let dark = BOOL::from(theme == Theme::Dark);
        unsafe {
            let rounded = DwmSetWindowAttribute(
                hwnd,
                DWMWA_WINDOW_CORNER_PREFERENCE,
                &corner as *const _ as *const c_void,
                std::mem::size_of_val(&corner) as u32,
            );
            let _ = DwmSetWindowAttribute(
                hwnd,
                DWMWA_USE_IMMERSIVE_DARK_MODE,
                &dark as *const _ as *const c_void,
                std::mem::size_of::<BOOL>() as u32,
            );
            if let Err(e) = rounded {
                tracing::debug!(error = %e, "theme dwm-corners unavailable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn wide_is_nul_terminated() {
        assert_eq!(super::wide("ab"), vec![b'a' as u16, b'b' as u16, 0]);
    }
}
