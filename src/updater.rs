// Fetches set_sdrwhite.exe from the set_maxtml release archive on demand.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::brightness::HELPER_EXE;
use crate::error::DownloadError;

pub const RELEASE_URL: &str =
    "https://github.com/ledoge/set_maxtml/releases/download/v0.2/release.zip";

/// The real archive is a few hundred KiB; anything far larger is not it.
pub const MAX_ARCHIVE_BYTES: u64 = 32 * 1024 * 1024;

fn fetch_archive(url: &str) -> Result<Vec<u8>, DownloadError> {
    tracing::info!(url, "helper-download start");
    let response = ureq::get(url)
        .set("User-Agent", concat!("HDR-SDR-Brightness/", env!("CARGO_PKG_VERSION")))
        .call()
        .map_err(Box::new)?;

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_ARCHIVE_BYTES + 1)
        .read_to_end(&mut body)?;
    if body.len() as u64 > MAX_ARCHIVE_BYTES {
        return Err(DownloadError::TooLarge(MAX_ARCHIVE_BYTES));
    }
    Ok(body)
}

fn is_helper_entry(name: &str) -> bool {
    name.rsplit(['/', '\\'])
        .next()
        .is_some_and(|base| base.eq_ignore_ascii_case(HELPER_EXE))
}

/// Pull the helper out of `archive` and write it into `dest_dir`.
pub fn extract_helper(archive: &[u8], dest_dir: &Path) -> Result<PathBuf, DownloadError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let index = (0..zip.len())
        .find(|&i| {
            zip.by_index(i)
                .is_ok_and(|entry| !entry.is_dir() && is_helper_entry(entry.name()))
        })
        .ok_or(DownloadError::MissingEntry(HELPER_EXE))?;

    let install_err = |source: io::Error| DownloadError::Install {
        path: dest_dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dest_dir).map_err(install_err)?;

    let target = dest_dir.join(HELPER_EXE);
    let partial = dest_dir.join(format!("{HELPER_EXE}.part"));
    {
        let mut entry = zip.by_index(index)?;
        let mut out = fs::File::create(&partial).map_err(install_err)?;
        io::copy(&mut entry, &mut out).map_err(install_err)?;
    }
    fs::rename(&partial, &target).map_err(|e| {
        let _ = fs::remove_file(&partial);
        install_err(e)
    })?;
    Ok(target)
}

/// Try each directory in turn; the first that accepts the file wins.
pub fn install_helper(archive: &[u8], dirs: &[PathBuf]) -> Result<PathBuf, DownloadError> {
    let mut last = DownloadError::MissingEntry(HELPER_EXE);
    for dir in dirs {
        match extract_helper(archive, dir) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "helper-download installed");
                return Ok(path);
            }
            // A bad archive will not get better in another directory.
            Err(e @ (DownloadError::Archive(_) | DownloadError::MissingEntry(_))) => return Err(e),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "helper-download dir-rejected");
                last = e;
            }
        }
    }
    Err(last)
}

/// Download the release and install the helper next to the executable,
/// or into the data directory if that is read-only.
pub fn download_helper() -> Result<PathBuf, DownloadError> {
    let archive = fetch_archive(RELEASE_URL)?;
    install_helper(&archive, &[crate::config::app_dir(), crate::config::data_dir()])
}

#[cfg(windows)]
pub use self::dialogs::{confirm_download, download_with_retry};

#[cfg(windows)]
mod dialogs {
    use std::path::PathBuf;

    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        MessageBoxW, IDRETRY, IDYES, MB_ICONQUESTION, MB_ICONWARNING, MB_RETRYCANCEL,
        MB_SETFOREGROUND, MB_YESNO,
    };

    use crate::brightness::HELPER_EXE;
    use crate::ui::wide;

    const TITLE: &str = "HDR SDR Brightness";

    /// Ask whether to fetch the missing helper.
    pub fn confirm_download(hwnd: HWND) -> bool {
        let text = wide(&format!(
            "{HELPER_EXE} was not found.\n\nDownload it from the set_maxtml release now?"
        ));
        let title = wide(TITLE);
        let choice = unsafe {
            MessageBoxW(
                Some(hwnd),
                PCWSTR(text.as_ptr()),
                PCWSTR(title.as_ptr()),
                MB_YESNO | MB_ICONQUESTION | MB_SETFOREGROUND,
            )
        };
        choice == IDYES
    }

    /// Download, offering Retry after every failure until it works or the
    /// user cancels.
    pub fn download_with_retry(hwnd: HWND) -> Option<PathBuf> {
        loop {
            match super::download_helper() {
                Ok(path) => return Some(path),
                Err(e) => {
                    tracing::error!(error = %e, "helper-download failed");
                    let text = wide(&format!("Could not install {HELPER_EXE}:\n{e}"));
                    let title = wide(TITLE);
                    let choice = unsafe {
                        MessageBoxW(
                            Some(hwnd),
                            PCWSTR(text.as_ptr()),
                            PCWSTR(title.as_ptr()),
                            MB_RETRYCANCEL | MB_ICONWARNING | MB_SETFOREGROUND,
                        )
                    };
                    if choice != IDRETRY {
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, opts).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_helper_from_nested_folder() {
        let zip = archive(&[
            ("release/readme.txt", b"hi"),
            ("release/Set_SdrWhite.exe", b"MZhelper"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = extract_helper(&zip, dir.path()).unwrap();
        assert_eq!(path, dir.path().join(HELPER_EXE));
        assert_eq!(fs::read(path).unwrap(), b"MZhelper");
        assert!(!dir.path().join(format!("{HELPER_EXE}.part")).exists());
    }

    #[test]
    fn archive_without_helper_is_rejected() {
        let zip = archive(&[("release/set_maxtml.exe", b"MZ")]);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_helper(&zip, dir.path()),
            Err(DownloadError::MissingEntry(_))
        ));
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_helper(b"not a zip", dir.path()),
            Err(DownloadError::Archive(_))
        ));
    }

    #[test]
    fn install_falls_back_to_second_directory() {
        let zip = archive(&[("set_sdrwhite.exe", b"MZ")]);
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let fallback = dir.path().join("data");

        let path = install_helper(&zip, &[blocker, fallback.clone()]).unwrap();
        assert_eq!(path, fallback.join(HELPER_EXE));
    }

    #[test]
    fn found_by_process_helper_after_install() {
        let zip = archive(&[("set_sdrwhite.exe", b"MZ")]);
        let dir = tempfile::tempdir().unwrap();
        install_helper(&zip, &[dir.path().to_path_buf()]).unwrap();
        let helper = crate::brightness::ProcessHelper::new(vec![dir.path().to_path_buf()]);
        assert_eq!(helper.locate(), Some(dir.path().join(HELPER_EXE)));
    }
}
