// Registry-based autostart for Windows
// Uses HKCU\Software\Microsoft\Windows\CurrentVersion\Run

use windows::core::PCWSTR;
use windows::Win32::System::Registry::{
    RegCloseKey, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY,
    HKEY_CURRENT_USER, KEY_READ, KEY_WRITE, REG_SAM_FLAGS, REG_SZ,
};

use crate::ui::wide;

const RUN_KEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Run";
const VALUE_NAME: &str = "HDR-SDR-Brightness";

/// Closes the key when dropped.
struct RunKey(HKEY);

impl RunKey {
    fn open(access: REG_SAM_FLAGS) -> Option<Self> {
        let key_path = wide(RUN_KEY);
        let mut hkey = HKEY::default();
        let result = unsafe {
            RegOpenKeyExW(HKEY_CURRENT_USER, PCWSTR(key_path.as_ptr()), Some(0), access, &mut hkey)
        };
        result.is_ok().then_some(Self(hkey))
    }
}

impl Drop for RunKey {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

/// Quoted command line stored in the Run value.
pub fn launch_command(exe: &std::path::Path) -> String {
    format!("\"{}\"", exe.display())
}

/// Enable autostart by setting registry value to current executable path
pub fn enable() -> bool {
    let Some(key) = RunKey::open(KEY_WRITE) else {
        return false;
    };
    let Ok(exe_path) = std::env::current_exe() else {
        return false;
    };
    let value_name = wide(VALUE_NAME);
    let data = wide(&launch_command(&exe_path));
    let data_bytes: Vec<u8> = data.iter().flat_map(|c| c.to_le_bytes()).collect();
    unsafe {
        RegSetValueExW(key.0, PCWSTR(value_name.as_ptr()), Some(0), REG_SZ, Some(&data_bytes))
            .is_ok()
    }
}

/// Disable autostart by removing the registry value
pub fn disable() -> bool {
    let Some(key) = RunKey::open(KEY_WRITE) else {
        return false;
    };
    let value_name = wide(VALUE_NAME);
    unsafe { RegDeleteValueW(key.0, PCWSTR(value_name.as_ptr())).is_ok() }
}

/// Check if autostart is currently enabled
pub fn is_enabled() -> bool {
    let Some(key) = RunKey::open(KEY_READ) else {
        return false;
    };
    let value_name = wide(VALUE_NAME);
    unsafe {
        RegQueryValueExW(key.0, PCWSTR(value_name.as_ptr()), None, None, None, None).is_ok()
    }
}

/// Flip the setting; returns the new state, or `None` if the registry
/// refused the change.
pub fn toggle() -> Option<bool> {
    let target = !is_enabled();
    let ok = if target { enable() } else { disable() };
    tracing::info!(enabled = target, ok, "autostart toggled");
    ok.then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_quoted() {
        let cmd = launch_command(std::path::Path::new(r"C:\Program Files\HDR\hdr.exe"));
        assert_eq!(cmd, r#""C:\Program Files\HDR\hdr.exe""#);
    }
}
