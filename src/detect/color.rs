//! Color-mask tracking inside the slider bar.
//!
//! The green target zone and the white slider needle are segmented in HSV
//! space. Hue uses the 0..180 scale so the calibrated ranges read the same
//! as the values measured during tuning.

use image::RgbaImage;

use crate::geometry::Rect;

/// Inclusive HSV range on (h: 0..180, s: 0..255, v: 0..255) scales.
#[derive(Clone, Copy, Debug)]
pub struct HsvRange {
    pub lo: (u8, u8, u8),
    pub hi: (u8, u8, u8),
}

/// The green target zone as rendered by the minigame.
pub const GREEN_ZONE: HsvRange = HsvRange {
    lo: (35, 50, 85),
    hi: (85, 255, 255),
};

/// The near-white slider needle.
pub const WHITE_SLIDER: HsvRange = HsvRange {
    lo: (0, 0, 200),
    hi: (180, 50, 255),
};

/// Converts RGB to HSV with h in 0..180 and s, v in 0..255.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let h = if delta < f32::EPSILON {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta) % 6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    let s = if max < f32::EPSILON { 0.0 } else { delta / max };

    ((h / 2.0) as u8, (s * 255.0) as u8, (max * 255.0) as u8)
}

fn in_range(hsv: (u8, u8, u8), range: &HsvRange) -> bool {
    hsv.0 >= range.lo.0
        && hsv.0 <= range.hi.0
        && hsv.1 >= range.lo.1
        && hsv.1 <= range.hi.1
        && hsv.2 >= range.lo.2
        && hsv.2 <= range.hi.2
}

/// Accumulated extents of mask hits within a region.
struct MaskExtent {
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    sum_x: i64,
    count: i64,
}

fn scan_mask(frame: &RgbaImage, region: Rect, range: &HsvRange) -> Option<MaskExtent> {
    let region = region.clipped(frame.width(), frame.height())?;
    let mut ext = MaskExtent {
        min_x: i32::MAX,
        max_x: i32::MIN,
        min_y: i32::MAX,
        max_y: i32::MIN,
        sum_x: 0,
        count: 0,
    };
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let p = frame.get_pixel(x as u32, y as u32);
            if in_range(rgb_to_hsv(p[0], p[1], p[2]), range) {
                ext.min_x = ext.min_x.min(x);
                ext.max_x = ext.max_x.max(x);
                ext.min_y = ext.min_y.min(y);
                ext.max_y = ext.max_y.max(y);
                ext.sum_x += x as i64;
                ext.count += 1;
            }
        }
    }
    if ext.count == 0 {
        return None;
    }
    Some(ext)
}

/// Bounding box of the green target zone inside the bar, or `None` when the
/// zone is not visible this frame.
pub fn track_color_zone(frame: &RgbaImage, bar: Rect) -> Option<Rect> {
    let ext = scan_mask(frame, bar, &GREEN_ZONE)?;
    Some(Rect::new(
        ext.min_x,
        ext.min_y,
        ext.max_x - ext.min_x,
        ext.max_y - ext.min_y,
    ))
}

/// Mean x position of the white slider needle inside the bar.
pub fn track_slider_x(frame: &RgbaImage, bar: Rect) -> Option<i32> {
    let ext = scan_mask(frame, bar, &WHITE_SLIDER)?;
    Some((ext.sum_x / ext.count) as i32)
}

/// Slider needle center plus its left/right extents, used by calibration to
/// measure the travel range.
pub fn track_slider_bounds(frame: &RgbaImage, bar: Rect) -> Option<(i32, i32, i32)> {
    let ext = scan_mask(frame, bar, &WHITE_SLIDER)?;
    Some(((ext.sum_x / ext.count) as i32, ext.min_x, ext.max_x))
}
