//! Rectangle value type used for all screen geometry.
//!
//! Bars, zones, icons, and squares are all `Rect`s. The calibration file
//! stores a rect as a 4-integer array, so `Rect` serializes to `[x, y, w, h]`.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in frame (client-area pixel) coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Center point of the rectangle.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn center_x(&self) -> f32 {
        self.x as f32 + self.w as f32 / 2.0
    }

    /// Whether the point lies inside the rectangle (inclusive edges).
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Clamps an x coordinate to the horizontal extent of the rectangle.
    pub fn clamp_x(&self, x: f32) -> f32 {
        x.clamp(self.x as f32, self.right() as f32)
    }

    /// Intersection with the frame bounds; `None` if nothing remains.
    pub fn clipped(&self, frame_w: u32, frame_h: u32) -> Option<Rect> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(frame_w as i32);
        let y2 = self.bottom().min(frame_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<[i32; 4]> for Rect {
    fn from(v: [i32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.w, r.h]
    }
}

/// A located UI element: where it was found and how well it matched.
///
/// "Not found" is always represented as an absent `DetectionResult`,
/// never as a sentinel coordinate.
#[derive(Clone, Copy, Debug)]
pub struct DetectionResult {
    pub rect: Rect,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_and_edges() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 60);
        assert_eq!(r.center(), (25, 40));
        assert!(r.contains(10, 20));
        assert!(r.contains(40, 60));
        assert!(!r.contains(41, 20));
    }

    #[test]
    fn test_clamp_x() {
        let r = Rect::new(100, 0, 50, 10);
        assert_eq!(r.clamp_x(90.0), 100.0);
        assert_eq!(r.clamp_x(125.0), 125.0);
        assert_eq!(r.clamp_x(200.0), 150.0);
    }

    #[test]
    fn test_clipped_to_frame() {
        let r = Rect::new(-10, -10, 50, 50);
        let c = r.clipped(100, 100).unwrap();
        assert_eq!(c, Rect::new(0, 0, 40, 40));

        assert!(Rect::new(200, 200, 10, 10).clipped(100, 100).is_none());
    }

    #[test]
    fn test_serde_as_array() {
        let r = Rect::new(1, 2, 3, 4);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: Rect = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
