//! Square-grid and circle analysis.
//!
//! Three detectors live here:
//! - the inventory square row below the slider bar, inferred from a
//!   vertical-gradient row profile,
//! - the gray square enclosing a matched bobber icon, picked as the
//!   smallest square-ish connected component containing the icon center,
//! - bright round blobs inside a rectangle, counted against a baseline to
//!   detect bubbles.

use image::GrayImage;

use crate::geometry::Rect;

/// Vertical gap between the bar and where the square search starts.
const SQUARE_GAP: i32 = 10;
/// Depth of the square search band below the bar.
const SQUARE_BAND: i32 = 120;
/// Minimum number of inferred squares for the row to be plausible.
const MIN_SQUARES: usize = 3;

/// Infers the inventory squares directly below the bar.
///
/// The top border of the squares is the first row whose mean vertical-edge
/// magnitude exceeds mean + 2*stddev of the band's row profile; the square
/// height comes from the brightness jump back up below that border. The
/// count is bar-width / height, rejected when fewer than three squares fit.
pub fn find_squares_below(gray: &GrayImage, bar: Rect) -> Vec<Rect> {
    let band = Rect::new(bar.x, bar.bottom() + SQUARE_GAP, bar.w, SQUARE_BAND);
    let Some(band) = band.clipped(gray.width(), gray.height()) else {
        return Vec::new();
    };
    if band.h < 3 {
        return Vec::new();
    }

    // Mean |d/dy| per row (3-tap central difference, Sobel-like).
    let mut profile = Vec::with_capacity(band.h as usize - 2);
    for y in (band.y + 1)..(band.bottom() - 1) {
        let mut sum = 0.0f64;
        for x in band.x..band.right() {
            let above = gray.get_pixel(x as u32, (y - 1) as u32)[0] as f64;
            let below = gray.get_pixel(x as u32, (y + 1) as u32)[0] as f64;
            sum += (below - above).abs();
        }
        profile.push(sum / band.w as f64);
    }

    let mean = profile.iter().sum::<f64>() / profile.len() as f64;
    let var = profile.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / profile.len() as f64;
    let cutoff = mean + 2.0 * var.sqrt();

    let Some(idx) = profile.iter().position(|&v| v > cutoff) else {
        return Vec::new();
    };
    let sq_top = band.y + 1 + idx as i32;

    // Square bottom: brightness of the row jumps back up past the border.
    let mut sq_h = 80;
    for y in (sq_top + 40)..(sq_top + 200).min(gray.height() as i32) {
        let mut sum = 0u64;
        for x in bar.x..bar.right() {
            sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
        }
        if (sum / bar.w as u64) > 100 {
            sq_h = y - sq_top;
            break;
        }
    }

    let count = ((bar.w as f32 / sq_h as f32).round() as usize).max(1);
    if count < MIN_SQUARES {
        return Vec::new();
    }
    let step = bar.w as f32 / count as f32;
    (0..count)
        .map(|i| {
            let x = bar.x + (i as f32 * step) as i32;
            let next = bar.x + ((i + 1) as f32 * step) as i32;
            Rect::new(x, sq_top, next - x, sq_h)
        })
        .collect()
}

/// Finds the gray square around a matched bobber icon.
///
/// Searches a window around the icon center for the smallest connected
/// bright component that contains the center, sits within a size band of
/// the expected side (`[hint/3, 2*hint]`), and is roughly square (aspect
/// 0.5..2.0). Returns the square plus the baseline circle count inside it.
pub fn find_enclosing_square(
    gray: &GrayImage,
    icon: Rect,
    size_hint: i32,
) -> Option<(Rect, usize)> {
    let (cx, cy) = icon.center();
    let expected = if size_hint > 0 {
        size_hint
    } else {
        icon.w.max(icon.h) * 2
    };
    let radius = (expected as f32 * 1.2) as i32;
    let window = Rect::new(cx - radius, cy - radius, radius * 2, radius * 2)
        .clipped(gray.width(), gray.height())?;

    let min_side = (expected / 3).max(40);
    let max_side = expected * 2;

    let boxes = component_boxes(gray, window, 50);
    let mut best: Option<Rect> = None;
    for b in boxes {
        if !b.contains(cx, cy) {
            continue;
        }
        if b.w < min_side || b.h < min_side || b.w > max_side || b.h > max_side {
            continue;
        }
        let ratio = b.w as f32 / b.h as f32;
        if !(0.5..=2.0).contains(&ratio) {
            continue;
        }
        // Smallest area wins so a background region never shadows the square.
        if best.map_or(true, |cur| b.w * b.h < cur.w * cur.h) {
            best = Some(b);
        }
    }

    let square = best?;
    let baseline = count_circles(gray, square);
    log::info!("Bobber square {:?}, baseline circles {}", square, baseline);
    Some((square, baseline))
}

/// Counts bright round blobs (bubble-sized, radius 4..20) inside `rect`.
pub fn count_circles(gray: &GrayImage, rect: Rect) -> usize {
    let Some(rect) = rect.clipped(gray.width(), gray.height()) else {
        return 0;
    };
    component_boxes(gray, rect, 140)
        .into_iter()
        .filter(|b| is_circle_like(gray, *b))
        .count()
}

fn is_circle_like(gray: &GrayImage, b: Rect) -> bool {
    // Diameter band matching the bubble radius range 4..20.
    if b.w < 8 || b.w > 40 || b.h < 8 || b.h > 40 {
        return false;
    }
    let ratio = b.w as f32 / b.h as f32;
    if !(0.6..=1.6).contains(&ratio) {
        return false;
    }
    // A disc fills ~pi/4 of its bounding box; a filled rectangle fills ~1.
    let mut filled = 0u32;
    for y in b.y..b.bottom() {
        for x in b.x..b.right() {
            if gray.get_pixel(x as u32, y as u32)[0] > 140 {
                filled += 1;
            }
        }
    }
    let fill = filled as f32 / (b.w * b.h) as f32;
    (0.5..=0.92).contains(&fill)
}

/// Bounding boxes of 4-connected components above `threshold` within `region`.
fn component_boxes(gray: &GrayImage, region: Rect, threshold: u8) -> Vec<Rect> {
    let w = region.w as usize;
    let h = region.h as usize;
    let mut visited = vec![false; w * h];
    let mut boxes = Vec::new();

    let bright = |x: usize, y: usize| {
        gray.get_pixel((region.x + x as i32) as u32, (region.y + y as i32) as u32)[0] > threshold
    };

    for sy in 0..h {
        for sx in 0..w {
            if visited[sy * w + sx] || !bright(sx, sy) {
                continue;
            }
            let (mut min_x, mut max_x, mut min_y, mut max_y) = (sx, sx, sy, sy);
            let mut stack = vec![(sx, sy)];
            visited[sy * w + sx] = true;
            while let Some((x, y)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                let mut push = |nx: usize, ny: usize, stack: &mut Vec<(usize, usize)>| {
                    if !visited[ny * w + nx] && bright(nx, ny) {
                        visited[ny * w + nx] = true;
                        stack.push((nx, ny));
                    }
                };
                if x > 0 {
                    push(x - 1, y, &mut stack);
                }
                if x + 1 < w {
                    push(x + 1, y, &mut stack);
                }
                if y > 0 {
                    push(x, y - 1, &mut stack);
                }
                if y + 1 < h {
                    push(x, y + 1, &mut stack);
                }
            }
            boxes.push(Rect::new(
                region.x + min_x as i32,
                region.y + min_y as i32,
                (max_x - min_x) as i32 + 1,
                (max_y - min_y) as i32 + 1,
            ));
        }
    }
    boxes
}
