// Small modal prompt for editing the schedule as one line of text.

use std::cell::RefCell;

use windows::core::{Result, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{GetStockObject, DEFAULT_GUI_FONT, HBRUSH, COLOR_WINDOW};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::*;

use super::wide;
use crate::geometry::Point;

const CLASS_NAME: &str = "HdrSdrBrightnessSchedule";
const ID_EDIT: i32 = 100;
const ID_OK: i32 = 1;
const ID_CANCEL: i32 = 2;

const WIDTH: i32 = 360;
const HEIGHT: i32 = 150;

#[derive(Default)]
struct DialogState {
    edit: Option<HWND>,
    done: bool,
    result: Option<String>,
}

thread_local! {
    static DIALOG: RefCell<DialogState> = RefCell::new(DialogState::default());
}

fn read_edit_text(edit: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(edit).max(0) as usize;
        let mut buf = vec![0u16; len + 1];
        let copied = GetWindowTextW(edit, &mut buf).max(0) as usize;
        String::from_utf16_lossy(&buf[..copied])
    }
}

fn child(
    parent: HWND,
    class: &str,
    text: &str,
    style: WINDOW_STYLE,
    ex: WINDOW_EX_STYLE,
    rect: (i32, i32, i32, i32),
    id: i32,
) -> Result<HWND> {
    let class = wide(class);
    let text = wide(text);
    unsafe {
        let hwnd = CreateWindowExW(
            ex,
            PCWSTR(class.as_ptr()),
            PCWSTR(text.as_ptr()),
            WS_CHILD | WS_VISIBLE | style,
            rect.0,
            rect.1,
            rect.2,
            rect.3,
            Some(parent),
            Some(HMENU(id as usize as *mut _)),
            None,
            None,
        )?;
        let font = GetStockObject(DEFAULT_GUI_FONT);
        SendMessageW(hwnd, WM_SETFONT, Some(WPARAM(font.0 as usize)), Some(LPARAM(1)));
        Ok(hwnd)
    }
}

/// Ask for `dayStart,nightStart,dayValue,nightValue`, pre-filled with
/// `current`. Returns `None` when cancelled.
pub fn prompt(owner: HWND, current: &str, near: Point) -> Result<Option<String>> {
    let class_name = wide(CLASS_NAME);
    let title = wide("Edit schedule");
    DIALOG.with(|d| *d.borrow_mut() = DialogState::default());

    unsafe {
        let hinstance = GetModuleHandleW(PCWSTR::null())?;
        let wc = WNDCLASSW {
            lpfnWndProc: Some(wnd_proc),
            hInstance: hinstance.into(),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            hbrBackground: HBRUSH((COLOR_WINDOW.0 + 1) as usize as *mut _),
            hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
            ..Default::default()
        };
        RegisterClassW(&wc);

        let x = (near.x - WIDTH).max(0);
        let y = (near.y - HEIGHT).max(0);
        let dlg = CreateWindowExW(
            WS_EX_DLGMODALFRAME | WS_EX_TOPMOST,
            PCWSTR(class_name.as_ptr()),
            PCWSTR(title.as_ptr()),
            WS_POPUP | WS_CAPTION | WS_SYSMENU,
            x,
            y,
            WIDTH,
            HEIGHT,
            Some(owner),
            None,
            Some(hinstance.into()),
            None,
        )?;

        child(
            dlg,
            "STATIC",
            "dayStart,nightStart,dayValue,nightValue  (e.g. 08:00,20:00,40,25)",
            WINDOW_STYLE(0),
            WINDOW_EX_STYLE(0),
            (12, 12, WIDTH - 36, 20),
            -1,
        )?;
        let edit = child(
            dlg,
            "EDIT",
            current,
            WS_TABSTOP | WINDOW_STYLE(ES_AUTOHSCROLL as u32),
            WS_EX_CLIENTEDGE,
            (12, 36, WIDTH - 36, 24),
            ID_EDIT,
        )?;
        child(
            dlg,
            "BUTTON",
            "OK",
            WS_TABSTOP | WINDOW_STYLE(BS_DEFPUSHBUTTON as u32),
            WINDOW_EX_STYLE(0),
            (WIDTH - 196, 72, 80, 26),
            ID_OK,
        )?;
        child(
            dlg,
            "BUTTON",
            "Cancel",
            WS_TABSTOP | WINDOW_STYLE(BS_PUSHBUTTON as u32),
            WINDOW_EX_STYLE(0),
            (WIDTH - 108, 72, 80, 26),
            ID_CANCEL,
        )?;
        DIALOG.with(|d| d.borrow_mut().edit = Some(edit));

        let _ = ShowWindow(dlg, SW_SHOW);
        let _ = SetForegroundWindow(dlg);
        let _ = windows::Win32::UI::Input::KeyboardAndMouse::SetFocus(Some(edit));
        SendMessageW(edit, EM_SETSEL, Some(WPARAM(0)), Some(LPARAM(-1)));

        // Local modal loop; the rest of the app keeps getting its messages.
        let mut msg = MSG::default();
        while !DIALOG.with(|d| d.borrow().done) {
            if !GetMessageW(&mut msg, None, 0, 0).as_bool() {
                PostQuitMessage(msg.wParam.0 as i32);
                break;
            }
            if !IsDialogMessageW(dlg, &msg).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        let _ = DestroyWindow(dlg);
    }
    Ok(DIALOG.with(|d| d.borrow_mut().result.take()))
}

fn finish(hwnd: HWND, accepted: bool) {
    DIALOG.with(|d| {
        let mut d = d.borrow_mut();
        if accepted {
            d.result = d.edit.map(read_edit_text);
        }
        d.done = true;
    });
    unsafe {
        let _ = ShowWindow(hwnd, SW_HIDE);
    }
}

unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_COMMAND => {
            match (wparam.0 & 0xFFFF) as i32 {
                ID_OK => finish(hwnd, true),
                ID_CANCEL => finish(hwnd, false),
                _ => {}
            }
            LRESULT(0)
        }
        WM_CLOSE => {
            finish(hwnd, false);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
