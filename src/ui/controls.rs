// Slider state, hit-testing and popup placement

use super::theme::*;
use crate::geometry::{Point, Rect};

/// State for the vertical brightness slider. 100 is at the top.
#[derive(Debug, Clone)]
pub struct SliderState {
    pub value: u8,
    pub dragging: bool,
    pub track: Rect,
}

impl Default for SliderState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SliderState {
    pub fn new(value: u8) -> Self {
        let cx = POPUP_WIDTH / 2;
        Self {
            value: value.min(100),
            dragging: false,
            track: Rect::new(cx - THUMB_OUTER_R, TRACK_TOP, cx + THUMB_OUTER_R, TRACK_BOTTOM),
        }
    }

    pub fn center_x(&self) -> i32 {
        (self.track.left + self.track.right) / 2
    }

    /// Get y position of the thumb centre for the current value
    pub fn thumb_y(&self) -> i32 {
        let h = self.track.height();
        self.track.bottom - (f32::from(self.value) / 100.0 * h as f32).round() as i32
    }

    /// Calculate value from a y position within the track
    pub fn value_from_y(&self, y: i32) -> u8 {
        let h = self.track.height();
        if h <= 0 {
            return self.value;
        }
        let rel = (self.track.bottom - y).clamp(0, h);
        ((rel as f32 / h as f32) * 100.0).round() as u8
    }

    /// The whole column around the track is grabbable, not just the thumb.
    pub fn hit(&self, p: Point) -> bool {
        p.y >= self.track.top - THUMB_OUTER_R && p.y <= self.track.bottom + THUMB_OUTER_R
    }
}

/// Top-left corner for a `width` x `height` popup next to the tray icon.
///
/// With no icon rectangle the popup goes into the corner of the work area
/// next to the taskbar. The result is always kept on `screen`.
pub fn popup_origin(width: i32, height: i32, icon: Option<Rect>, work: Rect, screen: Rect) -> Point {
    let (x, y) = match icon {
        // Taskbar docked right or left.
        Some(icon) if work.right < screen.right && icon.left >= work.right => {
            (icon.left - width - TASKBAR_GAP, icon.top)
        }
        Some(icon) if work.left > screen.left && icon.right <= work.left => {
            (icon.right + TASKBAR_GAP, icon.top)
        }
        Some(icon) if icon.top >= screen.top + screen.height() / 2 => {
            (icon.right - width, icon.top - height - TASKBAR_GAP)
        }
        Some(icon) => (icon.right - width, icon.bottom + TASKBAR_GAP),
        None => {
            let mut x = screen.right - width - 12;
            let mut y = screen.bottom - height - 48;
            if work.bottom < screen.bottom {
                y = work.bottom - height - TASKBAR_GAP;
            } else if work.top > screen.top {
                y = work.top + TASKBAR_GAP;
            }
            if work.right < screen.right {
                x = work.right - width - TASKBAR_GAP;
            } else if work.left > screen.left {
                x = work.left + TASKBAR_GAP;
            }
            (x, y)
        }
    };
    let max_x = (screen.right - width - OUTER_MARGIN).max(screen.left + OUTER_MARGIN);
    let max_y = (screen.bottom - height - OUTER_MARGIN).max(screen.top + OUTER_MARGIN);
    Point::new(
        x.clamp(screen.left + OUTER_MARGIN, max_x),
        y.clamp(screen.top + OUTER_MARGIN, max_y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0, 0, 1920, 1080);

    #[test]
    fn slider_ends_map_to_track_ends() {
        let s = SliderState::new(100);
        assert_eq!(s.thumb_y(), s.track.top);
        assert_eq!(SliderState::new(0).thumb_y(), s.track.bottom);
        assert_eq!(s.value_from_y(s.track.top - 50), 100);
        assert_eq!(s.value_from_y(s.track.bottom + 50), 0);
    }

    #[test]
    fn value_round_trips_through_thumb_position() {
        for v in 0..=100u8 {
            let s = SliderState::new(v);
            assert!(s.value_from_y(s.thumb_y()).abs_diff(v) <= 1, "value {v}");
        }
    }

    #[test]
    fn above_bottom_taskbar_icon() {
        let work = Rect::new(0, 0, 1920, 1032);
        let icon = Rect::new(1700, 1040, 1724, 1072);
        let p = popup_origin(56, 212, Some(icon), work, SCREEN);
        assert_eq!(p, Point::new(1724 - 56, 1040 - 212 - TASKBAR_GAP));
    }

    #[test]
    fn below_top_taskbar_icon() {
        let work = Rect::new(0, 48, 1920, 1080);
        let icon = Rect::new(1700, 8, 1724, 40);
        let p = popup_origin(56, 212, Some(icon), work, SCREEN);
        assert_eq!(p, Point::new(1668, 40 + TASKBAR_GAP));
    }

    #[test]
    fn beside_right_taskbar_icon() {
        let work = Rect::new(0, 0, 1872, 1080);
        let icon = Rect::new(1880, 900, 1912, 924);
        let p = popup_origin(56, 212, Some(icon), work, SCREEN);
        assert_eq!(p.x, 1880 - 56 - TASKBAR_GAP);
        assert_eq!(p.y, 1080 - 212 - OUTER_MARGIN);
    }

    #[test]
    fn work_area_fallback() {
        let work = Rect::new(0, 0, 1920, 1032);
        let p = popup_origin(56, 212, None, work, SCREEN);
        assert_eq!(p, Point::new(1920 - 56 - 12, 1032 - 212 - TASKBAR_GAP));
    }

    #[test]
    fn stays_on_screen() {
        let icon = Rect::new(0, 1040, 24, 1072);
        let p = popup_origin(56, 212, Some(icon), SCREEN, SCREEN);
        assert_eq!(p.x, OUTER_MARGIN);
    }
}
