//! Pixel-based direction tracking.
//!
//! Fallback strategy for sessions where the process memory reader is
//! unavailable. Consecutive frames are downsampled and the horizontal shift
//! of the left and right quarter-width strips is estimated by correlating
//! column-brightness profiles. Positive shift means the scene moves right,
//! which is the camera panning left.

use image::GrayImage;
use std::collections::VecDeque;

use crate::track::{Direction, DirectionTracker};

/// Downsample factor applied before profile extraction (~0.33x).
const DOWNSAMPLE: u32 = 3;
/// Maximum horizontal shift searched, in downsampled pixels.
const MAX_SHIFT: i32 = 8;
/// Ring buffer length for shift samples.
const BUFFER_LEN: usize = 5;
/// Weighted-average magnitude that classifies a direction.
const FLOW_THRESHOLD: f64 = 0.12;
/// Quiet ticks before the camera counts as stable.
const STABLE_TICKS: u32 = 30;

pub struct FlowTracker {
    prev: Option<Vec<Vec<f64>>>,
    buf: VecDeque<f64>,
    last_dir: Option<Direction>,
    moving: bool,
    stable_ticks: u32,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self {
            prev: None,
            buf: VecDeque::with_capacity(BUFFER_LEN),
            last_dir: None,
            moving: false,
            stable_ticks: 0,
        }
    }

    /// Column-mean brightness profiles of the left and right quarter strips.
    fn strip_profiles(gray: &GrayImage) -> Vec<Vec<f64>> {
        let w = gray.width() / DOWNSAMPLE;
        let h = gray.height() / DOWNSAMPLE;
        let strip_w = w / 4;
        let strips = [(0, strip_w), (w - strip_w, w)];

        strips
            .iter()
            .map(|&(x1, x2)| {
                (x1..x2)
                    .map(|col| {
                        let mut sum = 0.0;
                        for row in 0..h {
                            sum += gray.get_pixel(col * DOWNSAMPLE, row * DOWNSAMPLE)[0] as f64;
                        }
                        sum / h as f64
                    })
                    .collect()
            })
            .collect()
    }

    /// Best horizontal shift aligning `prev` to `cur`, with parabolic
    /// sub-pixel refinement around the integer minimum.
    fn profile_shift(prev: &[f64], cur: &[f64]) -> f64 {
        let n = prev.len() as i32;
        if n <= MAX_SHIFT * 2 {
            return 0.0;
        }
        let sad = |shift: i32| -> f64 {
            let mut total = 0.0;
            let mut count = 0;
            for i in 0..n {
                let j = i + shift;
                if j < 0 || j >= n {
                    continue;
                }
                total += (cur[j as usize] - prev[i as usize]).abs();
                count += 1;
            }
            if count == 0 {
                f64::MAX
            } else {
                total / count as f64
            }
        };

        let mut best = 0;
        let mut best_cost = f64::MAX;
        for s in -MAX_SHIFT..=MAX_SHIFT {
            let c = sad(s);
            if c < best_cost {
                best_cost = c;
                best = s;
            }
        }
        if best.abs() == MAX_SHIFT {
            return best as f64;
        }
        // Parabolic interpolation on the three costs around the minimum.
        let (c_l, c_0, c_r) = (sad(best - 1), best_cost, sad(best + 1));
        let denom = c_l - 2.0 * c_0 + c_r;
        if denom.abs() < 1e-12 {
            return best as f64;
        }
        best as f64 + 0.5 * (c_l - c_r) / denom
    }
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectionTracker for FlowTracker {
    fn update(&mut self, gray: Option<&GrayImage>) -> Option<Direction> {
        let Some(gray) = gray else {
            return self.last_dir;
        };
        let profiles = Self::strip_profiles(gray);
        let Some(prev) = self.prev.replace(profiles) else {
            return None;
        };
        let cur = self.prev.as_ref().unwrap();

        let shift = prev
            .iter()
            .zip(cur.iter())
            .map(|(p, c)| Self::profile_shift(p, c))
            .sum::<f64>()
            / prev.len() as f64;

        if self.buf.len() == BUFFER_LEN {
            self.buf.pop_front();
        }
        self.buf.push_back(shift);
        if self.buf.len() < 2 {
            return None;
        }

        // Recent samples weighted higher.
        let mut weighted = 0.0;
        let mut total_w = 0.0;
        for (i, v) in self.buf.iter().enumerate() {
            let w = (i + 1) as f64;
            weighted += v * w;
            total_w += w;
        }
        let avg = weighted / total_w;

        if avg.abs() > FLOW_THRESHOLD {
            self.moving = true;
            self.stable_ticks = 0;
        } else {
            self.stable_ticks += 1;
            if self.stable_ticks >= STABLE_TICKS {
                self.moving = false;
            }
        }

        // Scene moving right = camera panning left.
        let dir = if avg > FLOW_THRESHOLD {
            Some(Direction::Left)
        } else if avg < -FLOW_THRESHOLD {
            Some(Direction::Right)
        } else {
            self.last_dir
        };

        if dir.is_some() && dir != self.last_dir {
            log::info!("Camera direction: {} (avg={:.2})", dir.unwrap().as_str(), avg);
            self.last_dir = dir;
        }
        dir
    }

    fn moving(&self) -> bool {
        self.moving
    }

    fn reset(&mut self) {
        self.prev = None;
        self.buf.clear();
        self.last_dir = None;
        self.moving = false;
        self.stable_ticks = 0;
    }
}
