// Tray icon: a small sun drawn at runtime so the binary needs no resources.

/// BGRA pixel, the byte order a 32-bit top-down DIB expects.
pub type Bgra = [u8; 4];

const RAY: Bgra = [35, 173, 236, 255];
const DISK: Bgra = [47, 193, 249, 255];
const CORE: Bgra = [120, 224, 255, 255];
const CLEAR: Bgra = [0, 0, 0, 0];

// Geometry on a 64 px design grid.
const GRID: f32 = 64.0;
const CORE_R: f32 = 11.0;
const DISK_R: f32 = 17.0;
const RAY_INNER: f32 = 17.0;
const RAY_OUTER: f32 = 27.0;
const RAY_HALF_WIDTH: f32 = 2.0;

fn pixel_at(x: f32, y: f32) -> Bgra {
    let (dx, dy) = (x - GRID / 2.0, y - GRID / 2.0);
    let d = (dx * dx + dy * dy).sqrt();
    if d <= CORE_R {
        return CORE;
    }
    if d <= DISK_R {
        return DISK;
    }
    for k in 0..8 {
        let a = k as f32 * std::f32::consts::FRAC_PI_4;
        let (sin, cos) = a.sin_cos();
        let along = dx * cos + dy * sin;
        let across = (dy * cos - dx * sin).abs();
        if (RAY_INNER..=RAY_OUTER).contains(&along) && across <= RAY_HALF_WIDTH {
            return RAY;
        }
    }
    CLEAR
}

/// Row-major, top-down `size * size` pixels of the sun glyph.
pub fn sun_pixels(size: u32) -> Vec<Bgra> {
    let scale = GRID / size.max(1) as f32;
    (0..size * size)
        .map(|i| {
            let (x, y) = (i % size, i / size);
            pixel_at((x as f32 + 0.5) * scale, (y as f32 + 0.5) * scale)
        })
        .collect()
}

#[cfg(windows)]
pub use self::win::create_sun_icon;

#[cfg(windows)]
mod win {
    use std::ffi::c_void;

    use windows::core::{Result, BOOL};
    use windows::Win32::Graphics::Gdi::{
        CreateBitmap, CreateDIBSection, DeleteObject, GetDC, ReleaseDC, BITMAPINFO,
        BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HGDIOBJ,
    };
    use windows::Win32::UI::WindowsAndMessaging::{CreateIconIndirect, HICON, ICONINFO};

    use super::sun_pixels;

    /// Build an alpha-blended `HICON`. The caller owns it (`DestroyIcon`).
    pub fn create_sun_icon(size: u32) -> Result<HICON> {
        let pixels = sun_pixels(size);
        let side = size as i32;
        let bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: side,
                biHeight: -side,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        unsafe {
            let screen = GetDC(None);
            let mut bits: *mut c_void = std::ptr::null_mut();
            let color = CreateDIBSection(Some(screen), &bmi, DIB_RGB_COLORS, &mut bits, None, 0);
            ReleaseDC(None, screen);
            let color = color?;
            if !bits.is_null() {
                std::ptr::copy_nonoverlapping(
                    pixels.as_ptr() as *const u8,
                    bits as *mut u8,
                    pixels.len() * 4,
                );
            }
            let mask_bits = vec![0u8; ((size + 15) / 16 * 2 * size) as usize];
            let mask = CreateBitmap(side, side, 1, 1, Some(mask_bits.as_ptr() as *const c_void));

            let info = ICONINFO {
                fIcon: BOOL::from(true),
                xHotspot: 0,
                yHotspot: 0,
                hbmMask: mask,
                hbmColor: color,
            };
            let icon = CreateIconIndirect(&info);
            let _ = DeleteObject(HGDIOBJ::from(color));
            let _ = DeleteObject(HGDIOBJ::from(mask));
            icon
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_layers() {
        let px = sun_pixels(64);
        let at = |x: usize, y: usize| px[y * 64 + x];
        assert_eq!(px.len(), 64 * 64);
        assert_eq!(at(32, 32), CORE);
        assert_eq!(at(32 + 14, 32), DISK);
        assert_eq!(at(32 + 22, 32), RAY);
        assert_eq!(at(0, 0), CLEAR);
        // Between two rays.
        assert_eq!(at(32 + 20, 32 + 9), CLEAR);
    }

    #[test]
    fn small_sizes_keep_the_shape() {
        let px = sun_pixels(16);
        assert_eq!(px[8 * 16 + 8], CORE);
        assert_eq!(px[0], CLEAR);
    }
}
