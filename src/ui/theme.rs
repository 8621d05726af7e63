use crate::config::Theme;

/// `0x00BBGGRR`, the layout of a GDI `COLORREF`.
pub type Rgb = u32;

pub const fn rgb(r: u8, g: u8, b: u8) -> Rgb {
    (b as u32) << 16 | (g as u32) << 8 | r as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub panel: Rgb,
    pub border: Rgb,
    pub icon: Rgb,
    pub text: Rgb,
    pub track_active: Rgb,
    pub track_inactive: Rgb,
    pub thumb_fill: Rgb,
    pub thumb_ring: Rgb,
}

// ── Palettes ────────────────────────────────────────────────────────────────

const LIGHT: Palette = Palette {
    panel: rgb(0xF2, 0xF2, 0xF2),
    border: rgb(0xD7, 0xD7, 0xD7),
    icon: rgb(0x26, 0x26, 0x26),
    text: rgb(0x26, 0x26, 0x26),
    track_active: rgb(0x6D, 0x70, 0x30),
    track_inactive: rgb(0x9B, 0x9B, 0x9B),
    thumb_fill: rgb(0x6D, 0x70, 0x30),
    thumb_ring: rgb(0xF2, 0xF2, 0xF2),
};

const DARK: Palette = Palette {
    panel: rgb(0x1F, 0x1F, 0x1F),
    border: rgb(0x3A, 0x3A, 0x3A),
    icon: rgb(0xE8, 0xE8, 0xE8),
    text: rgb(0xE8, 0xE8, 0xE8),
    track_active: rgb(0x8F, 0x9A, 0x47),
    track_inactive: rgb(0x62, 0x62, 0x62),
    thumb_fill: rgb(0x8F, 0x9A, 0x47),
    thumb_ring: rgb(0x1F, 0x1F, 0x1F),
};

pub fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Light => LIGHT,
        Theme::Dark => DARK,
    }
}

// ── Popup dimensions ────────────────────────────────────────────────────────

pub const POPUP_WIDTH: i32 = 56;
pub const POPUP_HEIGHT: i32 = 212;

pub const POPUP_RADIUS: i32 = 8;

/// Sun glyph above the track.
pub const GLYPH_TOP: i32 = 12;
pub const GLYPH_SIZE: i32 = 20;

/// Vertical track, inset so the thumb never clips.
pub const TRACK_TOP: i32 = 46;
pub const TRACK_BOTTOM: i32 = POPUP_HEIGHT - 34;
pub const TRACK_WIDTH: i32 = 3;

pub const THUMB_OUTER_R: i32 = 7;
pub const THUMB_INNER_R: i32 = 4;

/// Percent label under the track.
pub const LABEL_TOP: i32 = POPUP_HEIGHT - 26;

/// Gap between the taskbar and the popup.
pub const TASKBAR_GAP: i32 = 2;
pub const OUTER_MARGIN: i32 = 6;

pub const FONT_SIZE_LABEL: i32 = -12;
pub const FONT_NAME: &str = "Segoe UI";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colorref_layout() {
        assert_eq!(rgb(0x12, 0x34, 0x56), 0x0056_3412);
    }

    #[test]
    fn thumb_ring_blends_into_panel() {
        for theme in [Theme::Light, Theme::Dark] {
            let p = palette(theme);
            assert_eq!(p.thumb_ring, p.panel);
        }
    }
}
