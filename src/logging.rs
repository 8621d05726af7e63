// Debug log file. Nothing is installed unless `-debug` was passed, so all
// `tracing` macros are no-ops in normal runs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILENAME: &str = "HDR-SDR-Brightness.log";

/// Rotate once the file reaches this size.
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Number of `.1`, `.2`, ... backups kept.
pub const LOG_BACKUPS: u32 = 3;

/// Returns true for `-debug` / `--debug` in any case.
pub fn debug_requested<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().any(|a| {
        let a = a.as_ref();
        a.eq_ignore_ascii_case("-debug") || a.eq_ignore_ascii_case("--debug")
    })
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `log` → `log.1` → `log.2` ... if `log` is at least `max_bytes`.
pub fn rotate(path: &Path, max_bytes: u64, backups: u32) -> io::Result<()> {
    let len = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if len < max_bytes {
        return Ok(());
    }
    if backups == 0 {
        return fs::remove_file(path);
    }
    let _ = fs::remove_file(backup_path(path, backups));
    for n in (1..backups).rev() {
        let from = backup_path(path, n);
        if from.exists() {
            fs::rename(&from, backup_path(path, n + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-only log file that rotates itself once it grows past `max_bytes`.
pub struct RotatingFile {
    path: PathBuf,
    file: Option<File>,
    len: u64,
    max_bytes: u64,
    backups: u32,
}

impl RotatingFile {
    pub fn open(path: PathBuf, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let _ = rotate(&path, max_bytes, backups);
        let file = open_append(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file: Some(file),
            len,
            max_bytes,
            backups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn roll(&mut self) -> io::Result<()> {
        // The handle must be closed before the rename on Windows.
        self.file = None;
        self.len = 0;
        rotate(&self.path, self.max_bytes, self.backups)
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.len >= self.max_bytes {
            self.roll()?;
        }
        if self.file.is_none() {
            let file = open_append(&self.path)?;
            self.len = file.metadata()?.len();
            self.file = Some(file);
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file closed"))?;
        let n = file.write(buf)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Open the log in the first directory that accepts it.
pub fn open_log_file(dirs: &[PathBuf]) -> Option<RotatingFile> {
    dirs.iter().find_map(|dir| {
        fs::create_dir_all(dir).ok()?;
        RotatingFile::open(dir.join(LOG_FILENAME), MAX_LOG_BYTES, LOG_BACKUPS).ok()
    })
}

/// `info` everywhere, `debug` for this crate so the wheel stage lines
/// (hit-test, miss, notify) land in the file. `RUST_LOG` overrides.
fn debug_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(concat!("info,", env!("CARGO_CRATE_NAME"), "=debug")))
}

fn file_subscriber<W>(writer: W, filter: EnvFilter) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(false)
        .finish()
}

/// Install the file subscriber. Returns the log path when logging is on.
pub fn init(debug: bool) -> Option<PathBuf> {
    if !debug {
        return None;
    }
    let file = open_log_file(&[crate::config::app_dir(), crate::config::data_dir()])?;
    let path = file.path().to_path_buf();
    let installed = file_subscriber(Mutex::new(file), debug_filter()).try_init().is_ok();
    if installed {
        tracing::info!(path = %path.display(), version = env!("CARGO_PKG_VERSION"), "log-start");
    }
    installed.then_some(path)
}
