use chrono::NaiveTime;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Directory name used under `%LOCALAPPDATA%` for config, log fallback and
/// helper fallback.
pub const APP_DIR_NAME: &str = "HDR-SDR-Brightness";
const CONFIG_FILE: &str = "config.ini";

const TIME_FORMAT: &str = "%H:%M";

/// Popup colour scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(()),
        }
    }
}

/// Application settings stored in `config.ini`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub manual: u8,
    pub day: u8,
    pub night: u8,
    pub day_start: NaiveTime,
    pub night_start: NaiveTime,
    pub auto_enabled: bool,
    pub theme: Theme,
    /// Seconds of inactivity before the popup closes itself; 0 keeps it open.
    pub popup_idle_seconds: u32,
}

fn default_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_night_start() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manual: 50,
            day: 70,
            night: 30,
            day_start: default_day_start(),
            night_start: default_night_start(),
            auto_enabled: true,
            theme: Theme::Dark,
            popup_idle_seconds: 6,
        }
    }
}

/// Clamp any integer into the 0–100 brightness range.
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Parse a strict-ish `HH:MM` clock value.
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    let (h, m) = text.split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    NaiveTime::parse_from_str(text, TIME_FORMAT).ok()
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

impl Config {
    /// Build a config from INI text. Anything missing or malformed falls back
    /// to the default for that key; unknown sections and keys are ignored.
    pub fn from_ini(text: &str) -> Self {
        let mut cfg = Config::default();
        let mut section = String::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_ascii_lowercase();
                continue;
            }
            let Some((key, value)) = line.split_once(['=', ':']) else {
                continue;
            };
            // Times contain ':' themselves, so only the first separator counts.
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match (section.as_str(), key.as_str()) {
                ("brightness", "manual") => set_percent(&mut cfg.manual, value),
                ("brightness", "day") => set_percent(&mut cfg.day, value),
                ("brightness", "night") => set_percent(&mut cfg.night, value),
                ("schedule", "enabled") => {
                    if let Ok(v) = value.parse::<i64>() {
                        cfg.auto_enabled = v == 1;
                    }
                }
                ("schedule", "daystart") => {
                    if let Some(t) = parse_clock(value) {
                        cfg.day_start = t;
                    }
                }
                ("schedule", "nightstart") => {
                    if let Some(t) = parse_clock(value) {
                        cfg.night_start = t;
                    }
                }
                ("ui", "theme") => {
                    if let Ok(t) = value.parse() {
                        cfg.theme = t;
                    }
                }
                ("ui", "popupidleseconds") => {
                    if let Ok(v) = value.parse::<u32>() {
                        cfg.popup_idle_seconds = v.min(3600);
                    }
                }
                _ => {}
            }
        }

        cfg
    }

    pub fn to_ini(&self) -> String {
        format!(
            "[Brightness]\n\
             Manual = {}\n\
             Day = {}\n\
             Night = {}\n\
             \n\
             [Schedule]\n\
             Enabled = {}\n\
             DayStart = {}\n\
             NightStart = {}\n\
             \n\
             [UI]\n\
             Theme = {}\n\
             PopupIdleSeconds = {}\n",
            self.manual.min(100),
            self.day.min(100),
            self.night.min(100),
            if self.auto_enabled { 1 } else { 0 },
            format_clock(self.day_start),
            format_clock(self.night_start),
            self.theme.as_str(),
            self.popup_idle_seconds,
        )
    }
}

fn set_percent(slot: &mut u8, value: &str) {
    if let Ok(v) = value.parse::<i64>() {
        *slot = clamp_percent(v);
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "manual={} day={} night={} day_start={} night_start={} auto={} theme={}",
            self.manual,
            self.day,
            self.night,
            format_clock(self.day_start),
            format_clock(self.night_start),
            self.auto_enabled,
            self.theme.as_str()
        )
    }
}

/// Per-user data directory (`%LOCALAPPDATA%\HDR-SDR-Brightness`), falling back
/// to the executable's directory.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(app_dir)
}

/// Directory holding the running executable.
pub fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE)
}

/// Sole owner of the live [`Config`]. Every change goes through [`ConfigStore::update`],
/// which clamps the values and persists them.
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Open the store at `path` and load whatever is there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = load_config(&path);
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Re-read the file, replacing the in-memory copy.
    pub fn load(&mut self) -> &Config {
        self.config = load_config(&self.path);
        &self.config
    }

    /// Mutate the config and flush it. A failed write is logged and the
    /// in-memory value is kept.
    pub fn update(&mut self, change: impl FnOnce(&mut Config)) -> Result<(), ConfigError> {
        change(&mut self.config);
        self.config.manual = self.config.manual.min(100);
        self.config.day = self.config.day.min(100);
        self.config.night = self.config.night.min(100);
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let result = save_config(&self.path, &self.config);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "config save-failed");
        }
        result
    }
}

/// Read the config at `path`. Never fails: a missing or unreadable file
/// yields defaults.
pub fn load_config(path: &Path) -> Config {
    match fs::read_to_string(path) {
        Ok(data) => Config::from_ini(&data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
        Err(source) => {
            let err = ConfigError::Read {
                path: path.to_path_buf(),
                source,
            };
            tracing::warn!(error = %err, "config load-failed using defaults");
            Config::default()
        }
    }
}

pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, config.to_ini()).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.ini"));
        assert_eq!(store.config(), &Config::default());
        assert_eq!(store.config().manual, 50);
        assert_eq!(store.config().day, 70);
        assert_eq!(store.config().night, 30);
        assert!(store.config().auto_enabled);
    }

    #[test]
    fn reads_python_style_lowercase_keys() {
        let text = "[Brightness]\nmanual = 35\nday = 40\nnight = 25\n\n[Schedule]\nenabled = 0\ndaystart = 07:30\nnightstart = 21:15\n\n[UI]\ntheme = light\n";
        let cfg = Config::from_ini(text);
        assert_eq!(cfg.manual, 35);
        assert_eq!(cfg.day, 40);
        assert_eq!(cfg.night, 25);
        assert!(!cfg.auto_enabled);
        assert_eq!(cfg.day_start, hm(7, 30));
        assert_eq!(cfg.night_start, hm(21, 15));
        assert_eq!(cfg.theme, Theme::Light);
    }

    #[test]
    fn out_of_range_and_garbage_values() {
        let text = "[Brightness]\nManual = 250\nDay = -4\nNight = lots\n[Schedule]\nDayStart = 25:00\nNightStart=7\n[UI]\nTheme = neon\nColour = red\n";
        let cfg = Config::from_ini(text);
        assert_eq!(cfg.manual, 100);
        assert_eq!(cfg.day, 0);
        assert_eq!(cfg.night, Config::default().night);
        assert_eq!(cfg.day_start, hm(8, 0));
        assert_eq!(cfg.night_start, hm(20, 0));
        assert_eq!(cfg.theme, Theme::Dark);
    }

    #[test]
    fn keys_outside_their_section_are_ignored() {
        let cfg = Config::from_ini("Manual = 10\n[UI]\nManual = 20\n");
        assert_eq!(cfg.manual, Config::default().manual);
    }

    #[test]
    fn corrupt_file_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x12]).unwrap();
        assert_eq!(load_config(&path), Config::default());
    }

    #[test]
    fn update_persists_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");
        let mut store = ConfigStore::open(&path);
        store
            .update(|c| {
                c.manual = 180;
                c.auto_enabled = false;
            })
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Manual = 100"));
        assert!(text.contains("Enabled = 0"));
        assert_eq!(load_config(&path).manual, 100);
    }

    #[test]
    fn save_into_unwritable_location_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let mut store = ConfigStore::open(blocker.join("config.ini"));
        let result = store.update(|c| c.manual = 10);
        assert!(matches!(result, Err(ConfigError::Write { .. })));
        assert_eq!(store.config().manual, 10);
    }

    #[test]
    fn save_of_load_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        save_config(&path, &Config::default()).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        save_config(&path, &load_config(&path)).unwrap();
        assert_eq!(first, fs::read_to_string(&path).unwrap());
    }

    proptest! {
        #[test]
        fn ini_round_trip(
            manual in 0u8..=100,
            day in 0u8..=100,
            night in 0u8..=100,
            ds in 0u32..1440,
            ns in 0u32..1440,
            auto in any::<bool>(),
            light in any::<bool>(),
            idle in 0u32..=3600,
        ) {
            let cfg = Config {
                manual,
                day,
                night,
                day_start: hm(ds / 60, ds % 60),
                night_start: hm(ns / 60, ns % 60),
                auto_enabled: auto,
                theme: if light { Theme::Light } else { Theme::Dark },
                popup_idle_seconds: idle,
            };
            prop_assert_eq!(Config::from_ini(&cfg.to_ini()), cfg);
        }
    }
}
