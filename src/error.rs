// Error types, one enum per concern. All of them are recovered where they
// occur; none is allowed to take the process down.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::input::WheelOrigin;

/// Reading or writing `config.ini`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Running the SDR white-level helper.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{} not found", crate::brightness::HELPER_EXE)]
    HelperMissing,
    #[error("helper exited with code {code:?}")]
    HelperFailed { code: Option<i32> },
    #[error("helper could not be started: {0}")]
    HelperSpawn(#[source] io::Error),
    #[error("helper did not finish within {0:?}")]
    HelperTimeout(Duration),
}

impl ApplyError {
    /// Coarse kind used to avoid repeating the same balloon on every tick.
    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::HelperMissing => "missing",
            ApplyError::HelperFailed { .. } | ApplyError::HelperSpawn(_) => "failed",
            ApplyError::HelperTimeout(_) => "timeout",
        }
    }
}

/// Fetching and installing the helper from the release archive.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download failed: {0}")]
    Http(#[from] Box<ureq::Error>),
    #[error("archive is not readable: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("archive does not contain {0}")]
    MissingEntry(&'static str),
    #[error("release archive exceeds {0} bytes")]
    TooLarge(u64),
    #[error("could not install into {path}: {source}")]
    Install {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Registering one of the wheel input mechanisms.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{origin:?} registration failed: {reason}")]
pub struct InputRegistrationError {
    pub origin: WheelOrigin,
    pub reason: String,
}

impl InputRegistrationError {
    pub fn new(origin: WheelOrigin, reason: impl Into<String>) -> Self {
        Self {
            origin,
            reason: reason.into(),
        }
    }
}
