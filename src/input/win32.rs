//! Win32 plumbing for the raw-input and low-level-hook wheel sources.
//!
//! Both end up as messages on the controller's window; routing decisions are
//! made by [`super::InputRouter`] on the UI thread.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::{
    GetRawInputData, RegisterRawInputDevices, HRAWINPUT, RAWINPUT, RAWINPUTDEVICE,
    RAWINPUTHEADER, RIDEV_INPUTSINK, RIDEV_REMOVE, RID_INPUT, RIM_TYPEMOUSE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PostMessageW, PostThreadMessageW,
    SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, MSG, MSLLHOOKSTRUCT, WH_MOUSE_LL, WM_APP,
    WM_MOUSEWHEEL, WM_QUIT,
};

use super::WheelOrigin;
use crate::error::InputRegistrationError;
use crate::geometry::Point;

/// Posted by the hook thread: `wParam` = signed delta, `lParam` = packed
/// screen point.
pub const WM_HOOK_WHEEL: u32 = WM_APP + 2;

const RI_MOUSE_WHEEL: u16 = 0x0400;
const HID_USAGE_PAGE_GENERIC: u16 = 0x01;
const HID_USAGE_GENERIC_MOUSE: u16 = 0x02;

/// Window that receives hook messages; 0 while no hook is installed.
static HOOK_TARGET: AtomicIsize = AtomicIsize::new(0);

pub fn pack_point(p: Point) -> isize {
    ((p.x as u16 as u32) | ((p.y as u16 as u32) << 16)) as i32 as isize
}

pub fn unpack_point(lparam: isize) -> Point {
    let v = lparam as u32;
    Point::new((v & 0xFFFF) as u16 as i16 as i32, (v >> 16) as u16 as i16 as i32)
}

fn mouse_device(hwnd: HWND, remove: bool) -> RAWINPUTDEVICE {
    RAWINPUTDEVICE {
        usUsagePage: HID_USAGE_PAGE_GENERIC,
        usUsage: HID_USAGE_GENERIC_MOUSE,
        dwFlags: if remove { RIDEV_REMOVE } else { RIDEV_INPUTSINK },
        hwndTarget: if remove { HWND::default() } else { hwnd },
    }
}

/// Deliver `WM_INPUT` for the mouse to `hwnd` even while it is in the
/// background.
pub fn register_raw_input(hwnd: HWND) -> Result<(), InputRegistrationError> {
    let devices = [mouse_device(hwnd, false)];
    unsafe { RegisterRawInputDevices(&devices, std::mem::size_of::<RAWINPUTDEVICE>() as u32) }
        .map_err(|e| InputRegistrationError::new(WheelOrigin::RawInput, e.to_string()))?;
    tracing::info!("wheel-rawinput registered");
    Ok(())
}

pub fn unregister_raw_input() {
    let devices = [mouse_device(HWND::default(), true)];
    unsafe {
        let _ = RegisterRawInputDevices(&devices, std::mem::size_of::<RAWINPUTDEVICE>() as u32);
    }
}

/// Wheel delta carried by a `WM_INPUT` message, if it is a wheel event.
pub fn read_raw_wheel(lparam: LPARAM) -> Option<i32> {
    let mut raw = RAWINPUT::default();
    let mut size = std::mem::size_of::<RAWINPUT>() as u32;
    let copied = unsafe {
        GetRawInputData(
            HRAWINPUT(lparam.0 as *mut _),
            RID_INPUT,
            Some(&mut raw as *mut RAWINPUT as *mut _),
            &mut size,
            std::mem::size_of::<RAWINPUTHEADER>() as u32,
        )
    };
    if copied == u32::MAX || copied == 0 || raw.header.dwType != RIM_TYPEMOUSE.0 {
        return None;
    }
    let buttons = unsafe { raw.data.mouse.Anonymous.Anonymous };
    if buttons.usButtonFlags & RI_MOUSE_WHEEL == 0 {
        return None;
    }
    Some(buttons.usButtonData as i16 as i32)
}

/// `WH_MOUSE_LL` hook on its own thread. Wheel messages are forwarded to the
/// target window; every event is passed on untouched. Dropping removes it.
pub struct WheelHook {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl WheelHook {
    pub fn install(target: HWND) -> Result<Self, InputRegistrationError> {
        let fail = |reason: String| InputRegistrationError::new(WheelOrigin::LowLevelHook, reason);
        HOOK_TARGET.store(target.0 as isize, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Result<u32, String>>();
        let thread = thread::Builder::new()
            .name("wheel-hook".to_string())
            .spawn(move || run_hook_thread(tx))
            .map_err(|e| fail(e.to_string()))?;

        match rx.recv() {
            Ok(Ok(thread_id)) => {
                tracing::info!(thread_id, "wheel-llhook installed");
                Ok(Self {
                    thread_id,
                    thread: Some(thread),
                })
            }
            Ok(Err(reason)) => {
                HOOK_TARGET.store(0, Ordering::SeqCst);
                let _ = thread.join();
                Err(fail(reason))
            }
            Err(_) => {
                HOOK_TARGET.store(0, Ordering::SeqCst);
                Err(fail("hook thread exited during setup".to_string()))
            }
        }
    }
}

impl Drop for WheelHook {
    fn drop(&mut self) {
        HOOK_TARGET.store(0, Ordering::SeqCst);
        unsafe {
            let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::info!("wheel-llhook removed");
    }
}

fn run_hook_thread(ready: mpsc::Sender<Result<u32, String>>) {
    let thread_id = unsafe { GetCurrentThreadId() };
    let hook = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(thread_id));

    // The hook only fires while this thread pumps messages.
    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            DispatchMessageW(&msg);
        }
        let _ = UnhookWindowsHookEx(hook);
    }
}

/// Low-level mouse hook callback. Must return quickly and never swallow
/// the event.
unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 && w_param.0 as u32 == WM_MOUSEWHEEL {
        // SAFETY: l_param points to a MSLLHOOKSTRUCT when n_code == HC_ACTION.
        let info = &*(l_param.0 as *const MSLLHOOKSTRUCT);
        let delta = (info.mouseData >> 16) as u16 as i16 as i32;
        let target = HOOK_TARGET.load(Ordering::Relaxed);
        if target != 0 && delta != 0 {
            let point = Point::new(info.pt.x, info.pt.y);
            let _ = PostMessageW(
                Some(HWND(target as *mut _)),
                WM_HOOK_WHEEL,
                WPARAM(delta as isize as usize),
                LPARAM(pack_point(point)),
            );
        }
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_survive_packing() {
        for p in [Point::new(0, 0), Point::new(1919, 1079), Point::new(-1280, -20)] {
            assert_eq!(unpack_point(pack_point(p)), p);
        }
    }
}
