//! Tray controller: owns every OS resource the app holds and is the only
//! place where Win32 messages meet the [`App`] state machine.
//!
//! Everything runs on the UI thread. OS callbacks call [`dispatch`], which
//! queues the event; the outermost call drains the queue, feeding each event
//! to `App::handle` and carrying out the returned effects. Effects that pump
//! messages themselves (menus, message boxes, the schedule dialog) can
//! therefore re-enter `dispatch` safely: the nested events are queued and
//! handled once the current one is done.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use windows::core::{Result, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromPoint, MONITORINFO, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::app::{App, AppEvent, Effect};
use crate::brightness::ProcessHelper;
use crate::config::{config_path, ConfigStore};
use crate::geometry::{Point, Rect};
use crate::input::win32::{self as wheel_os, WheelHook, WM_HOOK_WHEEL};
use crate::input::{self, WheelEvent, WheelOrigin, PROBE_WINDOW};
use crate::schedule::{LocalClock, TICK_INTERVAL};
use crate::tray::{self, MenuChecks, WM_TRAY_ICON};
use crate::ui::{popup, schedule_dialog, wide};
use crate::{autostart, hotkeys, icon, updater};

const CLASS_NAME: &str = "HdrSdrBrightnessHost";

const STARTUP_TIMER_ID: usize = 1;
const SCHEDULE_TIMER_ID: usize = 2;
const PROBE_TIMER_ID: usize = 3;

const STARTUP_DELAY: Duration = Duration::from_millis(500);

/// Icon rectangle lookups cross into Explorer; reuse them for a while.
const TRAY_RECT_TTL: Duration = Duration::from_secs(2);

const NIN_SELECT: u32 = 0x0400;
const NIN_KEYSELECT: u32 = 0x0401;

const ICON_SIZE: u32 = 32;

/// Host window, kept outside the `RefCell` so the panic hook can reach it.
static HOST_HWND: AtomicIsize = AtomicIsize::new(0);
static TASKBAR_CREATED: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static CONTEXT: RefCell<Option<TrayContext>> = const { RefCell::new(None) };
    static QUEUE: RefCell<VecDeque<AppEvent>> = const { RefCell::new(VecDeque::new()) };
    static PUMPING: Cell<bool> = const { Cell::new(false) };
}

/// Process-lifetime resources. Dropping it releases all of them.
struct TrayContext {
    hwnd: HWND,
    popup: HWND,
    icon: HICON,
    app: App<ProcessHelper, LocalClock>,
    hook: Option<WheelHook>,
    tray_v4: bool,
    hotkey_registered: bool,
    raw_input_registered: bool,
    tray_rect: Option<(Rect, Instant)>,
}

impl TrayContext {
    fn cached_tray_rect(&mut self, now: Instant) -> Option<Rect> {
        match self.tray_rect {
            Some((rect, at)) if now.saturating_duration_since(at) < TRAY_RECT_TTL => Some(rect),
            _ => {
                let rect = tray::icon_rect(self.hwnd);
                if rect.is_none() {
                    tracing::debug!("wheel-hit-test tray-rect unavailable");
                }
                self.tray_rect = rect.map(|r| (r, now));
                rect
            }
        }
    }
}

impl Drop for TrayContext {
    fn drop(&mut self) {
        tracing::info!("app-cleanup");
        self.hook = None;
        if self.raw_input_registered {
            wheel_os::unregister_raw_input();
        }
        if self.hotkey_registered {
            hotkeys::unregister(self.hwnd);
        }
        tray::remove_tray_icon(self.hwnd);
        HOST_HWND.store(0, Ordering::SeqCst);
        unsafe {
            let _ = KillTimer(Some(self.hwnd), SCHEDULE_TIMER_ID);
            let _ = DestroyWindow(self.popup);
            let _ = DestroyWindow(self.hwnd);
            let _ = DestroyIcon(self.icon);
        }
    }
}

fn with_context<R>(f: impl FnOnce(&mut TrayContext) -> R) -> Option<R> {
    CONTEXT.with(|c| c.borrow_mut().as_mut().map(f))
}

/// Queue an event and, unless already inside the loop, process the queue.
pub fn dispatch(event: AppEvent) {
    QUEUE.with(|q| q.borrow_mut().push_back(event));
    if PUMPING.with(|p| p.replace(true)) {
        return;
    }
    while let Some(event) = QUEUE.with(|q| q.borrow_mut().pop_front()) {
        let effects = with_context(|ctx| ctx.app.handle(event)).unwrap_or_default();
        for effect in effects {
            execute(effect);
        }
    }
    PUMPING.with(|p| p.set(false));
}

fn handles() -> Option<(HWND, HWND)> {
    with_context(|ctx| (ctx.hwnd, ctx.popup))
}

fn cursor_pos() -> Point {
    let mut pt = POINT::default();
    unsafe {
        let _ = GetCursorPos(&mut pt);
    }
    Point::new(pt.x, pt.y)
}

/// Monitor and work-area rectangles of the display containing `p`.
fn monitor_rects(p: Point) -> (Rect, Rect) {
    let mut info = MONITORINFO {
        cbSize: std::mem::size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    unsafe {
        let monitor = MonitorFromPoint(POINT { x: p.x, y: p.y }, MONITOR_DEFAULTTONEAREST);
        let _ = GetMonitorInfoW(monitor, &mut info);
    }
    (Rect::from(info.rcMonitor), Rect::from(info.rcWork))
}

fn execute(effect: Effect) {
    let Some((hwnd, popup_hwnd)) = handles() else {
        return;
    };
    match effect {
        Effect::ShowPopup { value } => {
            let now = Instant::now();
            let (icon_rect, idle) = with_context(|ctx| {
                let idle = ctx.app.config().popup_idle_seconds;
                (
                    ctx.cached_tray_rect(now),
                    (idle > 0).then(|| Duration::from_secs(u64::from(idle))),
                )
            })
            .unwrap_or((None, None));
            let anchor = icon_rect
                .map(|r| Point::new(r.left, r.top))
                .unwrap_or_else(cursor_pos);
            let (screen, work) = monitor_rects(anchor);
            let origin = crate::ui::controls::popup_origin(
                crate::ui::theme::POPUP_WIDTH,
                crate::ui::theme::POPUP_HEIGHT,
                icon_rect,
                work,
                screen,
            );
            popup::show(popup_hwnd, value, origin, idle);
        }
        Effect::UpdatePopup { value } => {
            if popup::is_visible(popup_hwnd) {
                popup::update(popup_hwnd, value);
            }
        }
        Effect::HidePopup => popup::hide(popup_hwnd),
        Effect::Notify { title, message } => tray::show_balloon(hwnd, &title, &message),
        Effect::OfferHelperDownload => {
            let installed =
                updater::confirm_download(hwnd) && updater::download_with_retry(hwnd).is_some();
            dispatch(if installed {
                AppEvent::HelperInstalled
            } else {
                AppEvent::HelperDownloadDeclined
            });
        }
        Effect::ArmInput(origin) => arm_input(hwnd, origin),
        Effect::ToggleAutostart => {
            if autostart::toggle().is_none() {
                tray::show_balloon(hwnd, "Autostart", "Could not change the startup setting.");
            }
        }
        Effect::ApplyTheme(theme) => popup::set_theme(popup_hwnd, theme),
        Effect::EditSchedule { current } => {
            match schedule_dialog::prompt(hwnd, &current, cursor_pos()) {
                Ok(Some(text)) => dispatch(AppEvent::ScheduleEdited(text)),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "schedule dialog-failed"),
            }
        }
        Effect::Quit => {
            let ctx = CONTEXT.with(|c| c.borrow_mut().take());
            drop(ctx);
            unsafe { PostQuitMessage(0) };
        }
    }
}

/// Set up one wheel source and report the outcome back to the app.
fn arm_input(hwnd: HWND, origin: WheelOrigin) {
    let now = Instant::now();
    let result = match origin {
        WheelOrigin::TrayNotification => {
            let icon = with_context(|ctx| ctx.icon).unwrap_or_default();
            if tray::add_tray_icon(hwnd, icon) {
                let v4 = tray::set_version_4(hwnd);
                with_context(|ctx| {
                    ctx.tray_v4 = v4;
                    ctx.tray_rect = None;
                });
                tracing::info!(v4, "wheel-setup tray-added");
                if v4 {
                    Ok(())
                } else {
                    Err(crate::error::InputRegistrationError::new(
                        origin,
                        "NOTIFYICON_VERSION_4 rejected",
                    ))
                }
            } else {
                Err(crate::error::InputRegistrationError::new(origin, "Shell_NotifyIcon add failed"))
            }
        }
        WheelOrigin::RawInput => wheel_os::register_raw_input(hwnd).map(|()| {
            with_context(|ctx| ctx.raw_input_registered = true);
        }),
        WheelOrigin::LowLevelHook => WheelHook::install(hwnd).map(|hook| {
            with_context(|ctx| ctx.hook = Some(hook));
        }),
    };
    match result {
        Ok(()) => {
            dispatch(AppEvent::InputArmed(origin, now));
            unsafe {
                SetTimer(Some(hwnd), PROBE_TIMER_ID, PROBE_WINDOW.as_millis() as u32, None);
            }
        }
        Err(error) => dispatch(AppEvent::InputRegistrationFailed { error, at: now }),
    }
}

fn on_wheel(delta: i32, origin: WheelOrigin, point: Option<Point>) {
    let at = Instant::now();
    let tray_rect = match origin {
        // Tray notifications are on the icon by definition.
        WheelOrigin::TrayNotification => None,
        _ => with_context(|ctx| ctx.cached_tray_rect(at)).flatten(),
    };
    dispatch(AppEvent::WheelScrolled {
        wheel: WheelEvent {
            delta,
            origin,
            at,
            point,
        },
        tray_rect,
    });
}

fn show_menu(hwnd: HWND) {
    let Some(checks) = with_context(|ctx| MenuChecks {
        auto_enabled: ctx.app.config().auto_enabled,
        autostart: autostart::is_enabled(),
        theme: ctx.app.config().theme,
    }) else {
        return;
    };
    if let Some(action) = tray::show_context_menu(hwnd, checks) {
        dispatch(AppEvent::MenuActionSelected(action));
    }
}

fn on_tray_callback(hwnd: HWND, wparam: WPARAM, lparam: LPARAM) {
    let (wparam, lparam) = (wparam.0 as u32, lparam.0 as u32);
    let code = input::notify_event_code(lparam);
    let v4 = with_context(|ctx| ctx.tray_v4).unwrap_or(false);
    let anchor = v4.then(|| input::notify_anchor(wparam));
    match code {
        NIN_SELECT | NIN_KEYSELECT if v4 => dispatch(AppEvent::TrayClicked),
        WM_LBUTTONUP if !v4 => dispatch(AppEvent::TrayClicked),
        WM_CONTEXTMENU if v4 => show_menu(hwnd),
        WM_RBUTTONUP if !v4 => show_menu(hwnd),
        input::WM_MOUSEMOVE => dispatch(AppEvent::TrayHover {
            point: anchor,
            at: Instant::now(),
        }),
        input::WM_MOUSEWHEEL => {
            let delta = input::notify_wheel_delta(wparam, lparam);
            if delta == 0 {
                tracing::warn!(wparam, lparam, "wheel-notify delta-missing");
            } else {
                tracing::debug!(delta, "wheel-notify wheel-event");
                on_wheel(delta, WheelOrigin::TrayNotification, anchor);
            }
        }
        _ => {}
    }
}

unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_TRAY_ICON => {
            on_tray_callback(hwnd, wparam, lparam);
            LRESULT(0)
        }

        WM_INPUT => {
            if let Some(delta) = wheel_os::read_raw_wheel(lparam) {
                on_wheel(delta, WheelOrigin::RawInput, Some(cursor_pos()));
            }
            // WM_INPUT must reach DefWindowProc so the system can free it.
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }

        WM_HOOK_WHEEL => {
            let delta = wparam.0 as isize as i32;
            on_wheel(
                delta,
                WheelOrigin::LowLevelHook,
                Some(wheel_os::unpack_point(lparam.0)),
            );
            LRESULT(0)
        }

        WM_HOTKEY => {
            if wparam.0 as i32 == hotkeys::HOTKEY_OPEN_SLIDER {
                tracing::info!("hotkey pressed");
                dispatch(AppEvent::HotkeyPressed);
            }
            LRESULT(0)
        }

        WM_TIMER => {
            match wparam.0 {
                STARTUP_TIMER_ID => {
                    let _ = KillTimer(Some(hwnd), STARTUP_TIMER_ID);
                    dispatch(AppEvent::Started);
                }
                SCHEDULE_TIMER_ID => dispatch(AppEvent::TimerTick),
                PROBE_TIMER_ID => {
                    let _ = KillTimer(Some(hwnd), PROBE_TIMER_ID);
                    dispatch(AppEvent::ProbeElapsed(Instant::now()));
                }
                _ => {}
            }
            LRESULT(0)
        }

        WM_ENDSESSION => {
            if wparam.0 != 0 {
                let ctx = CONTEXT.with(|c| c.borrow_mut().take());
                drop(ctx);
            }
            LRESULT(0)
        }

        m if m != 0 && m == TASKBAR_CREATED.load(Ordering::Relaxed) => {
            dispatch(AppEvent::TaskbarRecreated);
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

fn create_host_window() -> Result<HWND> {
    let class_name = wide(CLASS_NAME);
    let title = wide("HDR SDR Brightness");
    unsafe {
        let hinstance = GetModuleHandleW(PCWSTR::null())?;
        let wc = WNDCLASSW {
            lpfnWndProc: Some(wnd_proc),
            hInstance: hinstance.into(),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        RegisterClassW(&wc);

        // A real (hidden) top-level window: message-only windows miss the
        // TaskbarCreated broadcast.
        CreateWindowExW(
            WS_EX_TOOLWINDOW,
            PCWSTR(class_name.as_ptr()),
            PCWSTR(title.as_ptr()),
            WS_OVERLAPPED,
            0,
            0,
            0,
            0,
            None,
            None,
            Some(hinstance.into()),
            None,
        )
    }
}

/// Remove the tray icon and hotkey even if the process is going down hard.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "app-panic");
        let raw = HOST_HWND.swap(0, Ordering::SeqCst);
        if raw != 0 {
            let hwnd = HWND(raw as *mut _);
            hotkeys::unregister(hwnd);
            tray::remove_tray_icon(hwnd);
        }
        previous(info);
    }));
}

/// Build the context, register everything and run the message loop until
/// the user exits.
pub fn run() -> Result<()> {
    install_panic_hook();

    let hwnd = create_host_window()?;
    HOST_HWND.store(hwnd.0 as isize, Ordering::SeqCst);
    let taskbar_created = wide("TaskbarCreated");
    TASKBAR_CREATED.store(
        unsafe { RegisterWindowMessageW(PCWSTR(taskbar_created.as_ptr())) },
        Ordering::Relaxed,
    );

    let store = ConfigStore::open(config_path());
    let theme = store.config().theme;
    let app = App::new(store, ProcessHelper::with_default_dirs(), LocalClock);
    let popup = popup::create(theme)?;
    let icon = icon::create_sun_icon(ICON_SIZE)?;
    let hotkey_registered = hotkeys::register(hwnd).is_ok();

    CONTEXT.with(|c| {
        *c.borrow_mut() = Some(TrayContext {
            hwnd,
            popup,
            icon,
            app,
            hook: None,
            tray_v4: false,
            hotkey_registered,
            raw_input_registered: false,
            tray_rect: None,
        })
    });

    arm_input(hwnd, WheelOrigin::TrayNotification);
    arm_input(hwnd, WheelOrigin::RawInput);

    unsafe {
        SetTimer(Some(hwnd), STARTUP_TIMER_ID, STARTUP_DELAY.as_millis() as u32, None);
        SetTimer(Some(hwnd), SCHEDULE_TIMER_ID, TICK_INTERVAL.as_millis() as u32, None);

        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    // Loop ended without an Exit (e.g. WM_QUIT from elsewhere).
    let ctx = CONTEXT.with(|c| c.borrow_mut().take());
    drop(ctx);
    tracing::info!("app-exit");
    Ok(())
}
