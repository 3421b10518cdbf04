//! UI element detection on captured frames.
//!
//! This module provides:
//! - Template matching via normalized cross-correlation (`template`)
//! - Color-mask tracking for the green zone and white slider (`color`)
//! - Edge/contour analysis for squares and bubble circles (`shapes`)
//!
//! All detectors take an explicit region of interest and return `None` on a
//! miss; callers treat a miss as "retry next tick".

pub mod color;
pub mod shapes;
pub mod template;

use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use std::path::Path;

pub use color::{track_color_zone, track_slider_bounds, track_slider_x};
pub use shapes::{count_circles, find_enclosing_square, find_squares_below};
pub use template::match_template;

/// A captured frame of the game's client area.
pub type Frame = RgbaImage;

/// Converts a frame to grayscale using the BT.601 luma weights.
pub fn to_gray(frame: &Frame) -> GrayImage {
    let mut gray = GrayImage::new(frame.width(), frame.height());
    for (dst, src) in gray.pixels_mut().zip(frame.pixels()) {
        let y = 0.299 * src[0] as f32 + 0.587 * src[1] as f32 + 0.114 * src[2] as f32;
        dst[0] = y as u8;
    }
    gray
}

/// Reference images matched against frames.
///
/// Loaded once at session start and injected into the engine; templates are
/// grayscale crops of the minigame UI taken at the calibrated resolution.
pub struct TemplateSet {
    /// The green bar header used to locate the minigame panel.
    pub green_bar: GrayImage,
    /// The bobber icon shown during the strike phase.
    pub bobber: GrayImage,
    /// The "take the catch" dialog button.
    pub take: GrayImage,
}

impl TemplateSet {
    /// Loads the template images from a resource directory.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            green_bar: load_gray(&dir.join("green_bar.png"))?,
            bobber: load_gray(&dir.join("bobber.png"))?,
            take: load_gray(&dir.join("take.png"))?,
        })
    }
}

fn load_gray(path: &Path) -> Result<GrayImage> {
    let img = image::open(path)
        .with_context(|| format!("loading template {}", path.display()))?;
    Ok(img.to_luma8())
}
