// The slider popup window. Input is turned into application events; what
// the popup shows is driven back through show/update/hide.

use std::cell::RefCell;
use std::time::Duration;

use windows::core::{Result, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::*;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{ReleaseCapture, SetCapture, VK_ESCAPE};
use windows::Win32::UI::WindowsAndMessaging::*;

use super::controls::SliderState;
use super::theme::{palette, Palette, POPUP_HEIGHT, POPUP_WIDTH};
use super::{apply_window_theme, wide};
use crate::app::AppEvent;
use crate::config::Theme;
use crate::controller::dispatch;
use crate::geometry::Point;

const CLASS_NAME: &str = "HdrSdrBrightnessPopup";
const IDLE_TIMER_ID: usize = 200;

struct PopupState {
    slider: SliderState,
    palette: Palette,
    idle: Option<Duration>,
}

thread_local! {
    static STATE: RefCell<PopupState> = RefCell::new(PopupState {
        slider: SliderState::default(),
        palette: palette(Theme::default()),
        idle: None,
    });
}

fn with_state<R>(f: impl FnOnce(&mut PopupState) -> R) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

fn invalidate(hwnd: HWND) {
    unsafe {
        let _ = InvalidateRect(Some(hwnd), None, false);
    }
}

fn restart_idle_timer(hwnd: HWND) {
    let idle = with_state(|s| s.idle);
    unsafe {
        let _ = KillTimer(Some(hwnd), IDLE_TIMER_ID);
        if let Some(idle) = idle {
            SetTimer(Some(hwnd), IDLE_TIMER_ID, idle.as_millis() as u32, None);
        }
    }
}

/// Create the (hidden) popup window.
pub fn create(theme: Theme) -> Result<HWND> {
    let class_name = wide(CLASS_NAME);
    unsafe {
        let hinstance = GetModuleHandleW(PCWSTR::null())?;
        let wc = WNDCLASSW {
            style: CS_HREDRAW | CS_VREDRAW | CS_DROPSHADOW,
            lpfnWndProc: Some(wnd_proc),
            hInstance: hinstance.into(),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            hCursor: LoadCursorW(None, IDC_HAND).unwrap_or_default(),
            ..Default::default()
        };
        RegisterClassW(&wc);

        let hwnd = CreateWindowExW(
            WS_EX_TOPMOST | WS_EX_TOOLWINDOW,
            PCWSTR(class_name.as_ptr()),
            PCWSTR(class_name.as_ptr()),
            WS_POPUP,
            0,
            0,
            POPUP_WIDTH,
            POPUP_HEIGHT,
            None,
            None,
            Some(hinstance.into()),
            None,
        )?;
        set_theme(hwnd, theme);
        Ok(hwnd)
    }
}

pub fn set_theme(hwnd: HWND, theme: Theme) {
    with_state(|s| s.palette = palette(theme));
    apply_window_theme(hwnd, theme);
    invalidate(hwnd);
}

pub fn is_visible(hwnd: HWND) -> bool {
    unsafe { IsWindowVisible(hwnd).as_bool() }
}

/// Show at `origin` with `value`; `idle` of `None` keeps it open until
/// dismissed.
pub fn show(hwnd: HWND, value: u8, origin: Point, idle: Option<Duration>) {
    with_state(|s| {
        s.slider.value = value.min(100);
        s.slider.dragging = false;
        s.idle = idle;
    });
    unsafe {
        let _ = SetWindowPos(
            hwnd,
            Some(HWND_TOPMOST),
            origin.x,
            origin.y,
            POPUP_WIDTH,
            POPUP_HEIGHT,
            SWP_SHOWWINDOW,
        );
        let _ = SetForegroundWindow(hwnd);
    }
    restart_idle_timer(hwnd);
    invalidate(hwnd);
    tracing::info!(value, x = origin.x, y = origin.y, "slider-shown");
}

/// Reflect a value changed elsewhere (wheel, schedule). Ignored mid-drag.
pub fn update(hwnd: HWND, value: u8) {
    let changed = with_state(|s| {
        let changed = !s.slider.dragging && s.slider.value != value;
        if changed {
            s.slider.value = value.min(100);
        }
        changed
    });
    if changed {
        restart_idle_timer(hwnd);
        invalidate(hwnd);
    }
}

pub fn hide(hwnd: HWND) {
    let was_dragging = with_state(|s| std::mem::replace(&mut s.slider.dragging, false));
    unsafe {
        if was_dragging {
            let _ = ReleaseCapture();
        }
        let _ = KillTimer(Some(hwnd), IDLE_TIMER_ID);
        let _ = ShowWindow(hwnd, SW_HIDE);
    }
}

fn point_from_lparam(lparam: LPARAM) -> Point {
    Point::new(
        (lparam.0 & 0xFFFF) as i16 as i32,
        ((lparam.0 >> 16) & 0xFFFF) as i16 as i32,
    )
}

/// Window procedure
unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_PAINT => {
            let mut ps = PAINTSTRUCT::default();
            let hdc = BeginPaint(hwnd, &mut ps);

            // Double-buffer to avoid flicker
            let mut client = RECT::default();
            let _ = GetClientRect(hwnd, &mut client);

            let mem_dc = CreateCompatibleDC(Some(hdc));
            let mem_bmp = CreateCompatibleBitmap(hdc, client.right, client.bottom);
            let old_bmp = SelectObject(mem_dc, HGDIOBJ::from(mem_bmp));

            with_state(|s| super::painting::paint(mem_dc, &client, &s.slider, &s.palette));

            let _ = BitBlt(
                hdc,
                0,
                0,
                client.right,
                client.bottom,
                Some(mem_dc),
                0,
                0,
                SRCCOPY,
            );

            SelectObject(mem_dc, old_bmp);
            let _ = DeleteObject(HGDIOBJ::from(mem_bmp));
            let _ = DeleteDC(mem_dc);
            let _ = EndPaint(hwnd, &ps);
            LRESULT(0)
        }

        WM_LBUTTONDOWN => {
            let p = point_from_lparam(lparam);
            let grabbed = with_state(|s| {
                if !s.slider.hit(p) {
                    return None;
                }
                s.slider.dragging = true;
                s.slider.value = s.slider.value_from_y(p.y);
                Some(s.slider.value)
            });
            if let Some(value) = grabbed {
                SetCapture(hwnd);
                invalidate(hwnd);
                restart_idle_timer(hwnd);
                dispatch(AppEvent::SliderDragged(value));
            }
            LRESULT(0)
        }

        WM_MOUSEMOVE => {
            let p = point_from_lparam(lparam);
            let moved = with_state(|s| {
                if !s.slider.dragging {
                    return None;
                }
                let value = s.slider.value_from_y(p.y);
                (value != s.slider.value).then(|| {
                    s.slider.value = value;
                    value
                })
            });
            if let Some(value) = moved {
                invalidate(hwnd);
                dispatch(AppEvent::SliderDragged(value));
            }
            LRESULT(0)
        }

        WM_LBUTTONUP => {
            let released = with_state(|s| {
                std::mem::replace(&mut s.slider.dragging, false).then_some(s.slider.value)
            });
            if let Some(value) = released {
                let _ = ReleaseCapture();
                dispatch(AppEvent::SliderReleased(value));
            }
            LRESULT(0)
        }

        // Capture stolen mid-drag (e.g. a system dialog): commit what we have.
        WM_CAPTURECHANGED => {
            let released = with_state(|s| {
                std::mem::replace(&mut s.slider.dragging, false).then_some(s.slider.value)
            });
            if let Some(value) = released {
                dispatch(AppEvent::SliderReleased(value));
            }
            LRESULT(0)
        }

        WM_ACTIVATE => {
            if (wparam.0 & 0xFFFF) as u32 == WA_INACTIVE && is_visible(hwnd) {
                tracing::info!("slider-dismissed focus-lost");
                dispatch(AppEvent::PopupDismissed);
            }
            LRESULT(0)
        }

        WM_KEYDOWN if wparam.0 as u16 == VK_ESCAPE.0 => {
            dispatch(AppEvent::PopupDismissed);
            LRESULT(0)
        }

        WM_TIMER if wparam.0 == IDLE_TIMER_ID => {
            let _ = KillTimer(Some(hwnd), IDLE_TIMER_ID);
            if !with_state(|s| s.slider.dragging) {
                tracing::info!("slider-dismissed idle");
                dispatch(AppEvent::PopupDismissed);
            }
            LRESULT(0)
        }

        WM_MOUSEACTIVATE => LRESULT(MA_ACTIVATE as isize),

        WM_ERASEBKGND => {
            // Handled in WM_PAINT with double buffering
            LRESULT(1)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
