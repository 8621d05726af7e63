//! Mouse-wheel routing for the tray icon.
//!
//! Windows may report the same physical scroll up to three times: as a tray
//! icon notification, as Raw Input, and through a low-level mouse hook. The
//! [`InputRouter`] turns those into one stream of brightness steps:
//!
//! - providers are kept in priority order and armed one after another, each
//!   getting a probation window before the next one is tried;
//! - a lower-priority event is dropped while a higher-priority source has
//!   spoken within [`SOURCE_GRACE`];
//! - events from different sources that land within [`COALESCE_WINDOW`] of
//!   the last accepted one are treated as the same notch;
//! - Raw Input and hook events only count while the cursor is on the tray
//!   icon (its rectangle, or a recent hover anchor).
//!
//! Nothing in here touches the OS; the Win32 plumbing lives in
//! `win32` and feeds [`WheelEvent`]s in.

use std::time::{Duration, Instant};

use crate::error::InputRegistrationError;
use crate::geometry::{Point, Rect};

#[cfg(windows)]
pub mod win32;

/// One detent of a standard wheel.
pub const WHEEL_DELTA: i32 = 120;
/// Brightness change per notch.
pub const STEP_PER_NOTCH: i32 = 2;
/// Two sources reporting within this window describe the same notch.
pub const COALESCE_WINDOW: Duration = Duration::from_millis(60);
/// A lower-priority source is ignored while a better one spoke this recently.
pub const SOURCE_GRACE: Duration = Duration::from_millis(300);
/// How long an armed provider gets to prove itself before the next is tried.
pub const PROBE_WINDOW: Duration = Duration::from_millis(1500);
/// How long a tray mouse-move keeps the hover anchor valid.
pub const HOVER_GRACE: Duration = Duration::from_millis(1800);
/// Distance from the hover anchor still treated as "on the icon".
pub const HOVER_RADIUS_PX: i32 = 72;

const MISS_LOG_INTERVAL: Duration = Duration::from_millis(1200);

pub const WM_MOUSEFIRST: u32 = 0x0200;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_MOUSELAST: u32 = 0x020E;

/// Wheel delivery mechanisms, highest fidelity first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WheelOrigin {
    TrayNotification,
    RawInput,
    LowLevelHook,
}

impl WheelOrigin {
    pub const ALL: [WheelOrigin; 3] = [
        WheelOrigin::TrayNotification,
        WheelOrigin::RawInput,
        WheelOrigin::LowLevelHook,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            WheelOrigin::TrayNotification => "notify",
            WheelOrigin::RawInput => "rawinput",
            WheelOrigin::LowLevelHook => "llhook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelEvent {
    pub delta: i32,
    pub origin: WheelOrigin,
    pub at: Instant,
    /// Cursor position when known; needed for hit-testing Raw Input and hook
    /// events.
    pub point: Option<Point>,
}

/// Wheel delta in notches, never zero for a non-zero delta (precision
/// touchpads send fractions of [`WHEEL_DELTA`]).
pub fn notches(delta: i32) -> i32 {
    if delta.abs() >= WHEEL_DELTA {
        delta / WHEEL_DELTA
    } else {
        delta.signum()
    }
}

pub fn brightness_step(delta: i32) -> i32 {
    notches(delta) * STEP_PER_NOTCH
}

pub fn signed_word(value: u32) -> i32 {
    i32::from(value as u16 as i16)
}

/// Mouse message carried by a tray callback. Legacy callbacks put it in the
/// whole `lParam`, `NOTIFYICON_VERSION_4` puts it in the low word.
pub fn notify_event_code(lparam: u32) -> u32 {
    if (WM_MOUSEFIRST..=WM_MOUSELAST).contains(&lparam) {
        lparam
    } else {
        lparam & 0xFFFF
    }
}

/// Wheel delta from a tray `WM_MOUSEWHEEL` callback, or 0 when the shell did
/// not include one. Some shells keep the usual `HIWORD(wParam)` delta, version 4
/// callbacks carry anchor coordinates in `wParam` instead.
pub fn notify_wheel_delta(wparam: u32, lparam: u32) -> i32 {
    let from_w = signed_word(wparam >> 16);
    if from_w != 0 && from_w % WHEEL_DELTA == 0 {
        return from_w;
    }
    let from_l = signed_word(lparam >> 16);
    if from_l != 0 && from_l % WHEEL_DELTA == 0 {
        return from_l;
    }
    0
}

/// Anchor point packed into a version 4 tray callback's `wParam`.
pub fn notify_anchor(wparam: u32) -> Point {
    Point::new(signed_word(wparam & 0xFFFF), signed_word(wparam >> 16))
}

/// Remembers where the cursor last touched the tray icon.
#[derive(Debug, Default)]
pub struct HoverTracker {
    anchor: Option<Point>,
    until: Option<Instant>,
}

impl HoverTracker {
    pub fn mark(&mut self, point: Option<Point>, at: Instant) {
        match point {
            // Some shell paths report a bogus 0,0 anchor; keep the old one.
            Some(p) if p == Point::default() => {
                tracing::debug!("wheel-hover ignored-invalid-anchor");
            }
            Some(p) => self.anchor = Some(p),
            None => {}
        }
        self.until = Some(at + HOVER_GRACE);
    }

    pub fn is_recent(&self, point: Point, at: Instant) -> bool {
        match self.until {
            Some(until) if at <= until => match self.anchor {
                None => true,
                Some(a) => {
                    (point.x - a.x).abs() <= HOVER_RADIUS_PX
                        && (point.y - a.y).abs() <= HOVER_RADIUS_PX
                }
            },
            _ => false,
        }
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Idle,
    Armed { since: Instant },
    /// Delivered at least one wheel event over the icon.
    Live,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTest {
    Rect,
    Hover,
    Miss,
    /// Tray notifications are by definition on the icon.
    NotRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Brightness change to apply.
    Step(i32),
    /// A better source already covers this notch.
    Superseded,
    /// Same notch already reported by another source.
    Coalesced,
    /// Cursor not on the tray icon.
    Miss,
    Ignored,
}

pub struct InputRouter {
    providers: [ProviderState; 3],
    last_seen: [Option<Instant>; 3],
    last_accepted: Option<(WheelOrigin, Instant, i32)>,
    hover: HoverTracker,
    tray_rect: Option<Rect>,
    miss_count: u64,
    miss_logged_at: Option<Instant>,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            providers: [ProviderState::Idle; 3],
            last_seen: [None; 3],
            last_accepted: None,
            hover: HoverTracker::default(),
            tray_rect: None,
            miss_count: 0,
            miss_logged_at: None,
        }
    }

    pub fn state(&self, origin: WheelOrigin) -> ProviderState {
        self.providers[origin.index()]
    }

    pub fn arm(&mut self, origin: WheelOrigin, now: Instant) {
        if matches!(self.providers[origin.index()], ProviderState::Idle) {
            self.providers[origin.index()] = ProviderState::Armed { since: now };
            tracing::info!(origin = origin.label(), "wheel-setup armed");
        }
    }

    pub fn mark_failed(&mut self, err: &InputRegistrationError) {
        self.providers[err.origin.index()] = ProviderState::Failed;
        tracing::error!(origin = err.origin.label(), reason = %err.reason, "wheel-setup failed");
    }

    /// Explorer restarted; the tray source has to prove itself again.
    pub fn reset(&mut self, origin: WheelOrigin) {
        self.providers[origin.index()] = ProviderState::Idle;
        self.last_seen[origin.index()] = None;
        if origin == WheelOrigin::TrayNotification {
            self.tray_rect = None;
        }
    }

    pub fn set_tray_rect(&mut self, rect: Option<Rect>) {
        self.tray_rect = rect.filter(|r| !r.is_empty());
    }

    pub fn tray_rect(&self) -> Option<Rect> {
        self.tray_rect
    }

    pub fn mark_hover(&mut self, point: Option<Point>, at: Instant) {
        self.hover.mark(point, at);
    }

    /// Next provider to arm once everything armed so far has used up its
    /// probation without delivering, or `None` if nothing should change.
    pub fn next_fallback(&self, now: Instant) -> Option<WheelOrigin> {
        if self.providers.iter().any(|p| matches!(p, ProviderState::Live)) {
            return None;
        }
        let probation_over = self.providers.iter().all(|p| match p {
            ProviderState::Armed { since } => now.saturating_duration_since(*since) >= PROBE_WINDOW,
            _ => true,
        });
        if !probation_over {
            return None;
        }
        WheelOrigin::ALL
            .into_iter()
            .find(|o| matches!(self.providers[o.index()], ProviderState::Idle))
    }

    fn hit_test(&self, ev: &WheelEvent) -> HitTest {
        if ev.origin == WheelOrigin::TrayNotification {
            return HitTest::NotRequired;
        }
        let Some(point) = ev.point else {
            return HitTest::Miss;
        };
        if self.tray_rect.is_some_and(|r| r.contains_inclusive(point)) {
            HitTest::Rect
        } else if self.hover.is_recent(point, ev.at) {
            HitTest::Hover
        } else {
            HitTest::Miss
        }
    }

    pub fn accept(&mut self, ev: WheelEvent) -> Routed {
        if ev.delta == 0 {
            return Routed::Ignored;
        }

        let hit = self.hit_test(&ev);
        match hit {
            HitTest::Miss => {
                self.miss_count += 1;
                let due = self
                    .miss_logged_at
                    .map_or(true, |t| ev.at.saturating_duration_since(t) >= MISS_LOG_INTERVAL);
                if due {
                    self.miss_logged_at = Some(ev.at);
                    tracing::debug!(
                        origin = ev.origin.label(),
                        miss_count = self.miss_count,
                        point = ?ev.point,
                        anchor = ?self.hover.anchor(),
                        "wheel-{} miss",
                        ev.origin.label()
                    );
                }
                return Routed::Miss;
            }
            HitTest::Rect | HitTest::Hover => {
                tracing::debug!(origin = ev.origin.label(), hit = ?hit, "wheel-hit-test");
                // Keep a continuous scroll session alive even if the rect
                // lookup flickers.
                self.hover.mark(ev.point, ev.at);
            }
            HitTest::NotRequired => {}
        }

        let idx = ev.origin.index();
        if !matches!(self.providers[idx], ProviderState::Live) {
            tracing::info!(origin = ev.origin.label(), "wheel-router source-live");
            self.providers[idx] = ProviderState::Live;
        }
        self.last_seen[idx] = Some(ev.at);
        tracing::info!(origin = ev.origin.label(), delta = ev.delta, "wheel-{} received", ev.origin.label());

        let superseded = WheelOrigin::ALL[..idx].iter().any(|better| {
            self.last_seen[better.index()]
                .is_some_and(|seen| ev.at.saturating_duration_since(seen) <= SOURCE_GRACE)
        });
        if superseded {
            return Routed::Superseded;
        }

        let sign = ev.delta.signum();
        if let Some((origin, at, last_sign)) = self.last_accepted {
            if origin != ev.origin
                && last_sign == sign
                && ev.at.saturating_duration_since(at) <= COALESCE_WINDOW
            {
                // Each source's copy of a notch is consumed once; the next
                // copy from this source is a new notch.
                self.last_accepted = Some((ev.origin, ev.at, sign));
                return Routed::Coalesced;
            }
        }

        self.last_accepted = Some((ev.origin, ev.at, sign));
        Routed::Step(brightness_step(ev.delta))
    }
}
