// Prevents console window in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use hdr_sdr_brightness::logging;

#[cfg(windows)]
const SINGLE_INSTANCE_MUTEX: &str = "HdrSdrBrightnessMutex";

fn main() {
    let debug = logging::debug_requested(std::env::args().skip(1));
    let log_path = logging::init(debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?log_path, "app-start");

    std::process::exit(run());
}

#[cfg(windows)]
fn run() -> i32 {
    if is_already_running() {
        tracing::info!("another instance is running");
        return 0;
    }
    match hdr_sdr_brightness::controller::run() {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "app-start-failed");
            1
        }
    }
}

#[cfg(not(windows))]
fn run() -> i32 {
    eprintln!("hdr-sdr-brightness only runs on Windows.");
    1
}

/// Own a named mutex for the lifetime of the process; fails if another
/// instance already does.
#[cfg(windows)]
fn is_already_running() -> bool {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{GetLastError, ERROR_ALREADY_EXISTS};
    use windows::Win32::System::Threading::CreateMutexW;

    let name = hdr_sdr_brightness::ui::wide(SINGLE_INSTANCE_MUTEX);
    unsafe {
        match CreateMutexW(None, true, PCWSTR(name.as_ptr())) {
            // Held until the process exits.
            Ok(_) => GetLastError() == ERROR_ALREADY_EXISTS,
            Err(_) => false,
        }
    }
}
