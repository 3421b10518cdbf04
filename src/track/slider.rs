//! Slider velocity estimation.

use std::collections::VecDeque;

/// Number of recent samples kept for the regression.
const CAPACITY: usize = 8;
/// Fewer samples than this yields a zero velocity, never a stale one.
const MIN_SAMPLES: usize = 3;

/// Estimates slider velocity by least-squares regression of x against time
/// over the most recent samples.
#[derive(Debug, Default)]
pub struct SliderTracker {
    samples: VecDeque<(f64, f64)>,
}

impl SliderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Appends an observation (`t` in seconds, `x` in pixels).
    pub fn push(&mut self, t: f64, x: f64) {
        if self.samples.len() == CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back((t, x));
    }

    /// Velocity in pixels per time unit.
    ///
    /// Returns 0.0 with fewer than three samples or when the normal-equation
    /// denominator is degenerate (constant timestamps).
    pub fn velocity(&self) -> f64 {
        let n = self.samples.len();
        if n < MIN_SAMPLES {
            return 0.0;
        }
        let t0 = self.samples[0].0;
        let (mut st, mut sx, mut stx, mut stt) = (0.0, 0.0, 0.0, 0.0);
        for &(t, x) in &self.samples {
            let t = t - t0;
            st += t;
            sx += x;
            stx += t * x;
            stt += t * t;
        }
        let n = n as f64;
        let denom = n * stt - st * st;
        if denom.abs() < 1e-9 {
            return 0.0;
        }
        (n * stx - st * sx) / denom
    }
}
