//! Day/night scheduling.
//!
//! The scheduler only decides *what* the brightness should be; writing it is
//! left to the caller so the dedupe in [`crate::brightness::BrightnessApplier`]
//! stays the single source of truth for "last applied".

use chrono::{Local, NaiveTime, Timelike};
use std::time::Duration;

use crate::config::{clamp_percent, format_clock, parse_clock, Config};

/// How often the schedule is re-evaluated.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Wall-clock source, swappable in tests.
pub trait Clock {
    fn now(&self) -> NaiveTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Auto,
    ManualOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Night,
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Is `now` inside `[start, end)` on a 24h clock? Wrapping windows
/// (start after end) cover midnight; equal bounds cover the whole day.
pub fn in_clock_range(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    let (cur, start, end) = (minute_of_day(now), minute_of_day(start), minute_of_day(end));
    if start == end {
        return true;
    }
    if start < end {
        start <= cur && cur < end
    } else {
        cur >= start || cur < end
    }
}

pub fn period_at(now: NaiveTime, config: &Config) -> Period {
    if in_clock_range(now, config.day_start, config.night_start) {
        Period::Day
    } else {
        Period::Night
    }
}

pub fn target_for(period: Period, config: &Config) -> u8 {
    match period {
        Period::Day => config.day,
        Period::Night => config.night,
    }
}

/// Auto / ManualOverride state machine.
#[derive(Debug)]
pub struct Scheduler {
    mode: ScheduleMode,
}

impl Scheduler {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: if config.auto_enabled {
                ScheduleMode::Auto
            } else {
                ScheduleMode::ManualOverride
            },
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Value the schedule wants right now, or `None` while overridden.
    pub fn tick(&self, now: NaiveTime, config: &Config) -> Option<u8> {
        match self.mode {
            ScheduleMode::Auto => Some(target_for(period_at(now, config), config)),
            ScheduleMode::ManualOverride => None,
        }
    }

    /// Returns true when this call changed the mode.
    pub fn enter_manual_override(&mut self) -> bool {
        let changed = self.mode != ScheduleMode::ManualOverride;
        if changed {
            tracing::info!("schedule manual-override");
        }
        self.mode = ScheduleMode::ManualOverride;
        changed
    }

    pub fn resume_auto(&mut self) -> bool {
        let changed = self.mode != ScheduleMode::Auto;
        if changed {
            tracing::info!("schedule auto-resumed");
        }
        self.mode = ScheduleMode::Auto;
        changed
    }
}

/// A schedule typed by the user as `dayStart,nightStart,dayValue,nightValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEdit {
    pub day_start: NaiveTime,
    pub night_start: NaiveTime,
    pub day: u8,
    pub night: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleEditError {
    #[error("expected 4 comma-separated values")]
    FieldCount,
    #[error("times must be HH:MM")]
    Time,
    #[error("brightness must be an integer from 0 to 100")]
    Value,
}

impl ScheduleEdit {
    pub fn from_config(config: &Config) -> Self {
        Self {
            day_start: config.day_start,
            night_start: config.night_start,
            day: config.day,
            night: config.night,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ScheduleEditError> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        let [day_start, night_start, day, night] = parts.as_slice() else {
            return Err(ScheduleEditError::FieldCount);
        };
        let day_start = parse_clock(day_start).ok_or(ScheduleEditError::Time)?;
        let night_start = parse_clock(night_start).ok_or(ScheduleEditError::Time)?;
        let day = day.parse::<i64>().map_err(|_| ScheduleEditError::Value)?;
        let night = night.parse::<i64>().map_err(|_| ScheduleEditError::Value)?;
        Ok(Self {
            day_start,
            night_start,
            day: clamp_percent(day),
            night: clamp_percent(night),
        })
    }

    pub fn apply_to(&self, config: &mut Config) {
        config.day_start = self.day_start;
        config.night_start = self.night_start;
        config.day = self.day;
        config.night = self.night;
    }
}

impl std::fmt::Display for ScheduleEdit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            format_clock(self.day_start),
            format_clock(self.night_start),
            self.day,
            self.night
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn config(day_start: NaiveTime, night_start: NaiveTime) -> Config {
        Config {
            day_start,
            night_start,
            day: 70,
            night: 30,
            ..Config::default()
        }
    }

    #[test]
    fn classifies_every_minute_of_a_normal_day() {
        let cfg = config(hm(8, 0), hm(22, 0));
        for m in 0..1440 {
            let now = hm(m / 60, m % 60);
            let expected = if (480..1320).contains(&m) { Period::Day } else { Period::Night };
            assert_eq!(period_at(now, &cfg), expected, "minute {m}");
        }
    }

    #[test]
    fn classifies_every_minute_of_a_wrapping_day() {
        let cfg = config(hm(22, 0), hm(6, 0));
        for m in 0..1440 {
            let now = hm(m / 60, m % 60);
            let expected = if m >= 1320 || m < 360 { Period::Day } else { Period::Night };
            assert_eq!(period_at(now, &cfg), expected, "minute {m}");
        }
    }

    #[test]
    fn equal_bounds_mean_always_day() {
        let cfg = config(hm(9, 0), hm(9, 0));
        assert_eq!(period_at(hm(3, 0), &cfg), Period::Day);
        assert_eq!(period_at(hm(9, 0), &cfg), Period::Day);
    }

    #[test]
    fn seconds_do_not_affect_boundaries() {
        let cfg = config(hm(8, 0), hm(22, 0));
        let just_before_night = NaiveTime::from_hms_opt(21, 59, 59).unwrap();
        assert_eq!(period_at(just_before_night, &cfg), Period::Day);
    }

    #[test]
    fn override_suppresses_targets() {
        let cfg = config(hm(8, 0), hm(20, 0));
        let mut s = Scheduler::from_config(&cfg);
        assert_eq!(s.tick(hm(12, 0), &cfg), Some(70));
        assert_eq!(s.tick(hm(23, 0), &cfg), Some(30));

        assert!(s.enter_manual_override());
        assert!(!s.enter_manual_override());
        assert_eq!(s.tick(hm(12, 0), &cfg), None);

        assert!(s.resume_auto());
        assert_eq!(s.mode(), ScheduleMode::Auto);
    }

    #[test]
    fn disabled_config_starts_overridden() {
        let cfg = Config {
            auto_enabled: false,
            ..Config::default()
        };
        assert_eq!(Scheduler::from_config(&cfg).mode(), ScheduleMode::ManualOverride);
    }

    #[test]
    fn parses_schedule_edit() {
        let edit = ScheduleEdit::parse(" 07:15, 21:00 ,45,120").unwrap();
        assert_eq!(edit.day_start, hm(7, 15));
        assert_eq!(edit.night_start, hm(21, 0));
        assert_eq!(edit.day, 45);
        assert_eq!(edit.night, 100);
        assert_eq!(edit.to_string(), "07:15,21:00,45,100");
    }

    #[test]
    fn rejects_bad_schedule_edits() {
        assert_eq!(ScheduleEdit::parse("08:00,20:00,40"), Err(ScheduleEditError::FieldCount));
        assert_eq!(ScheduleEdit::parse("8am,20:00,40,25"), Err(ScheduleEditError::Time));
        assert_eq!(ScheduleEdit::parse("08:00,24:00,40,25"), Err(ScheduleEditError::Time));
        assert_eq!(ScheduleEdit::parse("08:00,20:00,bright,25"), Err(ScheduleEditError::Value));
    }

    proptest! {
        #[test]
        fn night_is_the_complement_of_day(start in 0u32..1440, end in 0u32..1440, now in 0u32..1440) {
            prop_assume!(start != end);
            let (s, e, n) = (hm(start / 60, start % 60), hm(end / 60, end % 60), hm(now / 60, now % 60));
            // Swapping the bounds flips every minute.
            prop_assert_ne!(in_clock_range(n, s, e), in_clock_range(n, e, s));
        }
    }
}
