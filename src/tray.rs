// System tray icon with context menu

use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, POINT};
use windows::Win32::UI::Shell::{
    Shell_NotifyIconGetRect, Shell_NotifyIconW, NIF_ICON, NIF_INFO, NIF_MESSAGE, NIF_SHOWTIP,
    NIF_TIP, NIIF_INFO, NIM_ADD, NIM_DELETE, NIM_MODIFY, NIM_SETVERSION, NOTIFYICONDATAW,
    NOTIFYICONIDENTIFIER, NOTIFYICON_VERSION_4,
};
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreatePopupMenu, DestroyMenu, GetCursorPos, PostMessageW, SetForegroundWindow,
    TrackPopupMenu, HICON, MF_CHECKED, MF_GRAYED, MF_SEPARATOR, MF_STRING, MF_UNCHECKED,
    TPM_BOTTOMALIGN, TPM_NONOTIFY, TPM_RETURNCMD, TPM_RIGHTALIGN, WM_NULL,
};

use crate::app::MenuAction;
use crate::config::Theme;
use crate::geometry::Rect;
use crate::ui::wide;

/// Custom message ID for tray icon callbacks
pub const WM_TRAY_ICON: u32 = 0x8001; // WM_APP + 1

const TRAY_UID: u32 = 1;
const TOOLTIP: &str = "HDR SDR Brightness";

/// Menu item IDs
pub const IDM_OPEN_SLIDER: u32 = 1001;
pub const IDM_APPLY_NOW: u32 = 1002;
pub const IDM_TOGGLE_AUTO: u32 = 1003;
pub const IDM_TOGGLE_AUTOSTART: u32 = 1004;
pub const IDM_THEME_LIGHT: u32 = 1005;
pub const IDM_THEME_DARK: u32 = 1006;
pub const IDM_HOTKEY_LABEL: u32 = 1007;
pub const IDM_EDIT_SCHEDULE: u32 = 1008;
pub const IDM_EXIT: u32 = 1009;

/// Checkmarks shown in the context menu.
#[derive(Debug, Clone, Copy)]
pub struct MenuChecks {
    pub auto_enabled: bool,
    pub autostart: bool,
    pub theme: Theme,
}

pub fn menu_action(id: u32) -> Option<MenuAction> {
    Some(match id {
        IDM_OPEN_SLIDER => MenuAction::OpenSlider,
        IDM_APPLY_NOW => MenuAction::ApplyNow,
        IDM_TOGGLE_AUTO => MenuAction::ToggleAuto,
        IDM_TOGGLE_AUTOSTART => MenuAction::ToggleAutostart,
        IDM_THEME_LIGHT => MenuAction::SetTheme(Theme::Light),
        IDM_THEME_DARK => MenuAction::SetTheme(Theme::Dark),
        IDM_EDIT_SCHEDULE => MenuAction::EditSchedule,
        IDM_EXIT => MenuAction::Exit,
        _ => return None,
    })
}

fn base_data(hwnd: HWND) -> NOTIFYICONDATAW {
    NOTIFYICONDATAW {
        cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
        hWnd: hwnd,
        uID: TRAY_UID,
        ..Default::default()
    }
}

fn copy_wide(dst: &mut [u16], s: &str) {
    let src = wide(s);
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
    if let Some(last) = dst.last_mut() {
        *last = 0;
    }
}

/// Add the system tray icon
pub fn add_tray_icon(hwnd: HWND, icon: HICON) -> bool {
    let mut nid = base_data(hwnd);
    nid.uFlags = NIF_ICON | NIF_MESSAGE | NIF_TIP | NIF_SHOWTIP;
    nid.uCallbackMessage = WM_TRAY_ICON;
    nid.hIcon = icon;
    copy_wide(&mut nid.szTip, TOOLTIP);
    unsafe {
        let _ = Shell_NotifyIconW(NIM_DELETE, &base_data(hwnd));
        Shell_NotifyIconW(NIM_ADD, &nid).as_bool()
    }
}

/// Ask for version 4 callbacks, which carry wheel and hover events with
/// the anchor point packed into `wParam`.
pub fn set_version_4(hwnd: HWND) -> bool {
    let mut nid = base_data(hwnd);
    nid.Anonymous.uVersion = NOTIFYICON_VERSION_4;
    unsafe { Shell_NotifyIconW(NIM_SETVERSION, &nid).as_bool() }
}

/// Remove the system tray icon
pub fn remove_tray_icon(hwnd: HWND) {
    unsafe {
        let _ = Shell_NotifyIconW(NIM_DELETE, &base_data(hwnd));
    }
}

/// Balloon notification from the tray icon.
pub fn show_balloon(hwnd: HWND, title: &str, message: &str) {
    let mut nid = base_data(hwnd);
    nid.uFlags = NIF_INFO;
    nid.dwInfoFlags = NIIF_INFO;
    copy_wide(&mut nid.szInfoTitle, title);
    copy_wide(&mut nid.szInfo, message);
    unsafe {
        let _ = Shell_NotifyIconW(NIM_MODIFY, &nid);
    }
}

/// Screen rectangle of our icon, if the shell will tell us.
pub fn icon_rect(hwnd: HWND) -> Option<Rect> {
    let id = NOTIFYICONIDENTIFIER {
        cbSize: std::mem::size_of::<NOTIFYICONIDENTIFIER>() as u32,
        hWnd: hwnd,
        uID: TRAY_UID,
        ..Default::default()
    };
    unsafe { Shell_NotifyIconGetRect(&id) }
        .ok()
        .map(Rect::from)
        .filter(|r| !r.is_empty())
}

/// Show the tray context menu and return the chosen command.
pub fn show_context_menu(hwnd: HWND, checks: MenuChecks) -> Option<MenuAction> {
    let checked = |on: bool| if on { MF_CHECKED } else { MF_UNCHECKED };
    let items = [
        (MF_STRING, IDM_OPEN_SLIDER, "Open slider"),
        (MF_STRING, IDM_APPLY_NOW, "Apply now"),
        (MF_STRING | checked(checks.auto_enabled), IDM_TOGGLE_AUTO, "Automatic schedule"),
        (MF_STRING | checked(checks.autostart), IDM_TOGGLE_AUTOSTART, "Start with Windows"),
        (MF_SEPARATOR, 0, ""),
        (MF_STRING | checked(checks.theme == Theme::Light), IDM_THEME_LIGHT, "Theme: light"),
        (MF_STRING | checked(checks.theme == Theme::Dark), IDM_THEME_DARK, "Theme: dark"),
        (MF_STRING | MF_GRAYED, IDM_HOTKEY_LABEL, "Hotkey: Win+Alt+S"),
        (MF_STRING, IDM_EDIT_SCHEDULE, "Edit schedule..."),
        (MF_SEPARATOR, 0, ""),
        (MF_STRING, IDM_EXIT, "Exit"),
    ];

    unsafe {
        let menu = match CreatePopupMenu() {
            Ok(menu) => menu,
            Err(e) => {
                tracing::error!(error = %e, "menu create-failed");
                return None;
            }
        };
        let labels: Vec<Vec<u16>> = items.iter().map(|(_, _, text)| wide(text)).collect();
        for ((flags, id, _), label) in items.iter().zip(&labels) {
            let text = if flags.contains(MF_SEPARATOR) {
                PCWSTR::null()
            } else {
                PCWSTR(label.as_ptr())
            };
            let _ = AppendMenuW(menu, *flags, *id as usize, text);
        }

        let mut pt = POINT::default();
        let _ = GetCursorPos(&mut pt);

        // Required for TrackPopupMenu to work correctly with tray icons
        let _ = SetForegroundWindow(hwnd);

        let cmd = TrackPopupMenu(
            menu,
            TPM_RIGHTALIGN | TPM_BOTTOMALIGN | TPM_RETURNCMD | TPM_NONOTIFY,
            pt.x,
            pt.y,
            Some(0),
            hwnd,
            None,
        );
        let _ = PostMessageW(Some(hwnd), WM_NULL, Default::default(), Default::default());
        let _ = DestroyMenu(menu);

        menu_action(cmd.0 as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_ids_map_to_actions() {
        assert_eq!(menu_action(IDM_THEME_LIGHT), Some(MenuAction::SetTheme(Theme::Light)));
        assert_eq!(menu_action(IDM_EXIT), Some(MenuAction::Exit));
        assert_eq!(menu_action(IDM_HOTKEY_LABEL), None);
        assert_eq!(menu_action(0), None);
    }
}
