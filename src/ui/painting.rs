// GDI owner-draw rendering of the slider popup

use super::controls::SliderState;
use super::theme::*;
use windows::Win32::Foundation::{COLORREF, RECT};
use windows::Win32::Graphics::Gdi::*;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn color(c: Rgb) -> COLORREF {
    COLORREF(c)
}

fn create_font(size: i32, weight: i32, family: &str) -> HFONT {
    let face: Vec<u16> = family.encode_utf16().chain(std::iter::once(0)).collect();
    unsafe {
        let mut lf = LOGFONTW {
            lfHeight: size,
            lfWeight: weight,
            lfQuality: CLEARTYPE_QUALITY,
            lfCharSet: DEFAULT_CHARSET,
            ..Default::default()
        };
        let len = face.len().min(32);
        lf.lfFaceName[..len].copy_from_slice(&face[..len]);
        CreateFontIndirectW(&lf)
    }
}

fn fill_rect_color(hdc: HDC, r: &RECT, c: Rgb) {
    unsafe {
        let brush = CreateSolidBrush(color(c));
        FillRect(hdc, r, brush);
        let _ = DeleteObject(HGDIOBJ::from(brush));
    }
}

fn draw_rounded_rect(hdc: HDC, r: &RECT, radius: i32, fill: Rgb, border: Rgb) {
    unsafe {
        let fill_brush = CreateSolidBrush(color(fill));
        let border_pen = CreatePen(PS_SOLID, 1, color(border));
        let old_brush = SelectObject(hdc, HGDIOBJ::from(fill_brush));
        let old_pen = SelectObject(hdc, HGDIOBJ::from(border_pen));
        let _ = RoundRect(hdc, r.left, r.top, r.right, r.bottom, radius, radius);
        SelectObject(hdc, old_pen);
        SelectObject(hdc, old_brush);
        let _ = DeleteObject(HGDIOBJ::from(fill_brush));
        let _ = DeleteObject(HGDIOBJ::from(border_pen));
    }
}

fn draw_circle(hdc: HDC, cx: i32, cy: i32, r: i32, c: Rgb) {
    unsafe {
        let brush = CreateSolidBrush(color(c));
        let pen = CreatePen(PS_SOLID, 0, color(c));
        let old_brush = SelectObject(hdc, HGDIOBJ::from(brush));
        let old_pen = SelectObject(hdc, HGDIOBJ::from(pen));
        let _ = Ellipse(hdc, cx - r, cy - r, cx + r, cy + r);
        SelectObject(hdc, old_pen);
        SelectObject(hdc, old_brush);
        let _ = DeleteObject(HGDIOBJ::from(brush));
        let _ = DeleteObject(HGDIOBJ::from(pen));
    }
}

fn draw_line(hdc: HDC, from: (i32, i32), to: (i32, i32), width: i32, c: Rgb) {
    unsafe {
        let pen = CreatePen(PS_SOLID, width, color(c));
        let old_pen = SelectObject(hdc, HGDIOBJ::from(pen));
        let _ = MoveToEx(hdc, from.0, from.1, None);
        let _ = LineTo(hdc, to.0, to.1);
        SelectObject(hdc, old_pen);
        let _ = DeleteObject(HGDIOBJ::from(pen));
    }
}

fn draw_text_centered(hdc: HDC, text: &str, cx: i32, y: i32, c: Rgb, font: HFONT) {
    unsafe {
        let old_font = SelectObject(hdc, HGDIOBJ::from(font));
        SetTextColor(hdc, color(c));
        SetBkMode(hdc, TRANSPARENT);
        let wide: Vec<u16> = text.encode_utf16().collect();
        let mut size = windows::Win32::Foundation::SIZE::default();
        let _ = GetTextExtentPoint32W(hdc, &wide, &mut size);
        let _ = TextOutW(hdc, cx - size.cx / 2, y, &wide);
        SelectObject(hdc, old_font);
    }
}

// ── Main paint function ─────────────────────────────────────────────────────

pub fn paint(hdc: HDC, client: &RECT, slider: &SliderState, palette: &Palette) {
    // Corners outside the rounded panel; DWM rounding covers most of it.
    fill_rect_color(hdc, client, palette.panel);
    draw_rounded_rect(hdc, client, POPUP_RADIUS, palette.panel, palette.border);

    draw_sun_glyph(hdc, slider.center_x(), GLYPH_TOP + GLYPH_SIZE / 2, palette);
    draw_track(hdc, slider, palette);

    let font = create_font(FONT_SIZE_LABEL, 500, FONT_NAME);
    draw_text_centered(
        hdc,
        &format!("{}%", slider.value),
        slider.center_x(),
        LABEL_TOP,
        palette.text,
        font,
    );
    unsafe {
        let _ = DeleteObject(HGDIOBJ::from(font));
    }
}

// ── Section renderers ───────────────────────────────────────────────────────

fn draw_sun_glyph(hdc: HDC, cx: i32, cy: i32, palette: &Palette) {
    let half = GLYPH_SIZE / 2;
    for k in 0..8 {
        let (sin, cos) = (k as f32 * std::f32::consts::FRAC_PI_4).sin_cos();
        let at = |r: f32| (cx + (cos * r).round() as i32, cy + (sin * r).round() as i32);
        draw_line(hdc, at(half as f32 * 0.65), at(half as f32), 2, palette.icon);
    }
    draw_circle(hdc, cx, cy, half / 2, palette.icon);
}

fn draw_track(hdc: HDC, slider: &SliderState, palette: &Palette) {
    let cx = slider.center_x();
    let thumb_y = slider.thumb_y();
    draw_line(
        hdc,
        (cx, slider.track.top),
        (cx, slider.track.bottom),
        TRACK_WIDTH,
        palette.track_inactive,
    );
    draw_line(
        hdc,
        (cx, thumb_y),
        (cx, slider.track.bottom),
        TRACK_WIDTH,
        palette.track_active,
    );
    draw_circle(hdc, cx, thumb_y, THUMB_OUTER_R, palette.thumb_ring);
    draw_circle(hdc, cx, thumb_y, THUMB_INNER_R, palette.thumb_fill);
}
