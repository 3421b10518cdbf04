//! Template matching via zero-mean normalized cross-correlation.
//!
//! Equivalent to OpenCV's `TM_CCOEFF_NORMED`: both the template and each
//! candidate window are mean-centered before correlating, so the score is
//! invariant to uniform brightness shifts. Matching is always restricted to
//! a caller-supplied region because a full-frame scan is too slow for the
//! per-tick budget.

use image::GrayImage;

use crate::geometry::{DetectionResult, Rect};

/// Searches `region` of `gray` for the best placement of `template`.
///
/// Returns the match rectangle (in frame coordinates) and its correlation
/// score, or `None` if the best score is below `threshold` or the region is
/// smaller than the template.
pub fn match_template(
    gray: &GrayImage,
    template: &GrayImage,
    region: Rect,
    threshold: f32,
) -> Option<DetectionResult> {
    let region = region.clipped(gray.width(), gray.height())?;
    let (tw, th) = (template.width() as i32, template.height() as i32);
    if region.w < tw || region.h < th {
        return None;
    }

    // Mean-center the template once.
    let t_pixels: Vec<f32> = template.pixels().map(|p| p[0] as f32).collect();
    let t_mean = t_pixels.iter().sum::<f32>() / t_pixels.len() as f32;
    let t_centered: Vec<f32> = t_pixels.iter().map(|v| v - t_mean).collect();
    let t_norm: f32 = t_centered.iter().map(|v| v * v).sum::<f32>().sqrt();
    if t_norm < f32::EPSILON {
        // A flat template matches everything equally; treat as a miss.
        return None;
    }

    let mut best_score = f32::MIN;
    let mut best_pos = (0, 0);

    for oy in 0..=(region.h - th) {
        for ox in 0..=(region.w - tw) {
            let score = window_score(gray, region.x + ox, region.y + oy, tw, th, &t_centered, t_norm);
            if score > best_score {
                best_score = score;
                best_pos = (region.x + ox, region.y + oy);
            }
        }
    }

    if best_score < threshold {
        return None;
    }
    Some(DetectionResult {
        rect: Rect::new(best_pos.0, best_pos.1, tw, th),
        score: best_score,
    })
}

fn window_score(
    gray: &GrayImage,
    x0: i32,
    y0: i32,
    tw: i32,
    th: i32,
    t_centered: &[f32],
    t_norm: f32,
) -> f32 {
    let n = (tw * th) as f32;
    let mut sum = 0.0f32;
    for dy in 0..th {
        for dx in 0..tw {
            sum += gray.get_pixel((x0 + dx) as u32, (y0 + dy) as u32)[0] as f32;
        }
    }
    let mean = sum / n;

    let mut dot = 0.0f32;
    let mut norm = 0.0f32;
    let mut i = 0usize;
    for dy in 0..th {
        for dx in 0..tw {
            let v = gray.get_pixel((x0 + dx) as u32, (y0 + dy) as u32)[0] as f32 - mean;
            dot += v * t_centered[i];
            norm += v * v;
            i += 1;
        }
    }
    if norm < f32::EPSILON {
        return 0.0;
    }
    dot / (norm.sqrt() * t_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checker(w: u32, h: u32, phase: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x + y + phase) % 2 == 0 {
                Luma([200u8])
            } else {
                Luma([40u8])
            }
        })
    }

    /// Embeds `patch` into `img` at (x, y).
    fn blit(img: &mut GrayImage, patch: &GrayImage, x: u32, y: u32) {
        for py in 0..patch.height() {
            for px in 0..patch.width() {
                img.put_pixel(x + px, y + py, *patch.get_pixel(px, py));
            }
        }
    }

    #[test]
    fn test_finds_embedded_template() {
        let mut frame = GrayImage::from_pixel(120, 80, Luma([128u8]));
        let template = checker(10, 8, 0);
        blit(&mut frame, &template, 57, 33);

        let m = match_template(&frame, &template, Rect::new(0, 0, 120, 80), 0.9)
            .expect("template should be found");
        assert_eq!(m.rect, Rect::new(57, 33, 10, 8));
        assert!(m.score > 0.99);
    }

    #[test]
    fn test_region_restricts_search() {
        let mut frame = GrayImage::from_pixel(120, 80, Luma([128u8]));
        let template = checker(10, 8, 0);
        blit(&mut frame, &template, 57, 33);

        // The template lies outside this region, so nothing should match.
        assert!(match_template(&frame, &template, Rect::new(0, 0, 40, 20), 0.9).is_none());
    }

    #[test]
    fn test_threshold_rejects_weak_match() {
        let frame = GrayImage::from_pixel(60, 40, Luma([128u8]));
        let template = checker(10, 8, 0);
        assert!(match_template(&frame, &template, Rect::new(0, 0, 60, 40), 0.5).is_none());
    }

    #[test]
    fn test_region_smaller_than_template() {
        let frame = GrayImage::from_pixel(60, 40, Luma([128u8]));
        let template = checker(20, 20, 0);
        assert!(match_template(&frame, &template, Rect::new(0, 0, 10, 10), 0.1).is_none());
    }

    #[test]
    fn test_brightness_invariance() {
        let mut frame = GrayImage::from_pixel(80, 60, Luma([100u8]));
        // A dimmed copy of the template still correlates strongly.
        let template = checker(12, 10, 0);
        let dimmed = GrayImage::from_fn(12, 10, |x, y| {
            Luma([template.get_pixel(x, y)[0].saturating_sub(30)])
        });
        blit(&mut frame, &dimmed, 20, 15);

        let m = match_template(&frame, &template, Rect::new(0, 0, 80, 60), 0.9)
            .expect("dimmed template should still match");
        assert_eq!(m.rect, Rect::new(20, 15, 12, 10));
    }
}
