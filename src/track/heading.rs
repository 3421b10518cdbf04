//! Memory-derived direction tracking.
//!
//! During the reel phase the player entity rotates with the camera, so the
//! pan direction can be read as the sign of the yaw drift. Yaw deltas are
//! wrap-corrected at the ±180° boundary and integrated with an exponential
//! moving average; classification uses a deadband with hysteresis so noise
//! never flips an established direction.

use image::GrayImage;

use crate::memory::YawSource;
use crate::track::{Direction, DirectionTracker};

/// EMA weight for new deltas (roughly a 2-3 sample window).
const EMA_ALPHA: f64 = 0.4;
/// Accumulator magnitude above which the camera counts as moving.
const MOVING_THRESHOLD: f64 = 0.2;
/// Accumulator magnitude needed to (re)classify a direction.
const DIRECTION_THRESHOLD: f64 = 0.3;
/// Quiet ticks before the camera counts as stable (~1.5 s at 50 ms ticks).
const STABLE_TICKS: u32 = 30;

pub struct HeadingTracker {
    source: Box<dyn YawSource>,
    prev_yaw: Option<f64>,
    last_dir: Option<Direction>,
    accum: f64,
    moving: bool,
    stable_ticks: u32,
}

impl HeadingTracker {
    pub fn new(source: Box<dyn YawSource>) -> Self {
        Self {
            source,
            prev_yaw: None,
            last_dir: None,
            accum: 0.0,
            moving: false,
            stable_ticks: 0,
        }
    }

    /// Signed yaw delta with wrap-around correction at ±180°.
    fn wrap_delta(from: f64, to: f64) -> f64 {
        let mut delta = to - from;
        if delta > 180.0 {
            delta -= 360.0;
        } else if delta < -180.0 {
            delta += 360.0;
        }
        delta
    }
}

impl DirectionTracker for HeadingTracker {
    fn update(&mut self, _gray: Option<&GrayImage>) -> Option<Direction> {
        // A failed read keeps the last known direction; the reader already
        // demoted itself to disconnected.
        let Some(yaw) = self.source.read_yaw() else {
            return self.last_dir;
        };

        let Some(prev) = self.prev_yaw.replace(yaw) else {
            return None;
        };
        let delta = Self::wrap_delta(prev, yaw);
        self.accum = EMA_ALPHA * delta + (1.0 - EMA_ALPHA) * self.accum;

        if self.accum.abs() > MOVING_THRESHOLD {
            self.moving = true;
            self.stable_ticks = 0;
        } else {
            self.stable_ticks += 1;
            if self.stable_ticks >= STABLE_TICKS {
                self.moving = false;
            }
        }

        let dir = if self.accum > DIRECTION_THRESHOLD {
            Some(Direction::Right)
        } else if self.accum < -DIRECTION_THRESHOLD {
            Some(Direction::Left)
        } else {
            self.last_dir
        };

        if dir.is_some() && dir != self.last_dir {
            log::info!(
                "Heading direction: {} (accum={:.2}, delta={:.2})",
                dir.unwrap().as_str(),
                self.accum,
                delta
            );
            self.last_dir = dir;
        }
        dir
    }

    fn moving(&self) -> bool {
        self.moving
    }

    fn connected(&self) -> bool {
        self.source.connected()
    }

    fn ensure_connected(&mut self) -> bool {
        self.source.connected() || self.source.connect()
    }

    fn reset(&mut self) {
        self.prev_yaw = None;
        self.last_dir = None;
        self.accum = 0.0;
        self.moving = false;
        self.stable_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeYaw {
        values: Vec<f64>,
        index: usize,
    }

    impl FakeYaw {
        fn new(values: &[f64]) -> Box<Self> {
            Box::new(Self {
                values: values.to_vec(),
                index: 0,
            })
        }
    }

    impl YawSource for FakeYaw {
        fn connected(&self) -> bool {
            true
        }

        fn connect(&mut self) -> bool {
            true
        }

        fn read_yaw(&mut self) -> Option<f64> {
            let v = self.values.get(self.index).copied();
            self.index += 1;
            v
        }
    }

    fn drive(tracker: &mut HeadingTracker, n: usize) -> Option<Direction> {
        let mut dir = None;
        for _ in 0..n {
            dir = tracker.update(None);
        }
        dir
    }

    #[test]
    fn test_wrap_around_is_continuous_rightward() {
        // +1°/tick across the ±180° seam must never read as a ±358° jump.
        let seq = [178.0, 179.0, 180.0, -179.0, -178.0, -177.0];
        let mut tracker = HeadingTracker::new(FakeYaw::new(&seq));
        let dir = drive(&mut tracker, seq.len());
        assert_eq!(dir, Some(Direction::Right));
        assert!(tracker.moving());
        // Accumulator converges toward +1, never explodes.
        assert!(tracker.accum > 0.3 && tracker.accum < 1.5);
    }

    #[test]
    fn test_hysteresis_retains_direction_in_deadband() {
        // Strong rightward drift, then flat readings inside the deadband.
        let mut seq = vec![0.0, 2.0, 4.0, 6.0, 8.0];
        seq.extend(std::iter::repeat(8.0).take(10));
        let mut tracker = HeadingTracker::new(FakeYaw::new(&seq));
        let dir = drive(&mut tracker, seq.len());
        // Deadband must not flip right to none or left.
        assert_eq!(dir, Some(Direction::Right));
    }

    #[test]
    fn test_opposite_threshold_flips_direction() {
        let mut seq = vec![0.0, 2.0, 4.0, 6.0];
        // Sustained leftward drift eventually crosses the opposite threshold.
        for i in 1..=10 {
            seq.push(6.0 - 3.0 * i as f64);
        }
        let mut tracker = HeadingTracker::new(FakeYaw::new(&seq));
        let dir = drive(&mut tracker, seq.len());
        assert_eq!(dir, Some(Direction::Left));
    }

    #[test]
    fn test_stable_after_quiet_period() {
        let mut seq = vec![0.0, 2.0, 4.0, 6.0, 8.0];
        seq.extend(std::iter::repeat(8.0).take(40));
        let mut tracker = HeadingTracker::new(FakeYaw::new(&seq));
        drive(&mut tracker, seq.len());
        assert!(!tracker.moving(), "camera should stabilize after 30 quiet ticks");
    }

    #[test]
    fn test_first_sample_reports_nothing() {
        let mut tracker = HeadingTracker::new(FakeYaw::new(&[100.0]));
        assert_eq!(tracker.update(None), None);
        assert!(!tracker.moving());
    }

    #[test]
    fn test_read_failure_retains_last_direction() {
        let seq = [0.0, 3.0, 6.0, 9.0, 12.0];
        let mut tracker = HeadingTracker::new(FakeYaw::new(&seq));
        let dir = drive(&mut tracker, seq.len());
        assert_eq!(dir, Some(Direction::Right));
        // Source exhausted: read_yaw returns None from here on.
        assert_eq!(tracker.update(None), Some(Direction::Right));
    }

    #[test]
    fn test_reset_clears_state() {
        let seq = [0.0, 5.0, 10.0, 15.0];
        let mut tracker = HeadingTracker::new(FakeYaw::new(&seq));
        drive(&mut tracker, seq.len());
        tracker.reset();
        assert!(!tracker.moving());
        assert_eq!(tracker.accum, 0.0);
        assert_eq!(tracker.last_dir, None);
    }
}
