//! Motion estimation: slider velocity and camera pan direction.
//!
//! Direction tracking has two interchangeable strategies behind one trait:
//! `HeadingTracker` integrates yaw read from process memory, `FlowTracker`
//! estimates horizontal scene motion from consecutive frames. The phase
//! machine picks one at session start and never mixes them.

pub mod flow;
pub mod heading;
pub mod slider;

use image::GrayImage;

pub use flow::FlowTracker;
pub use heading::HeadingTracker;
pub use slider::SliderTracker;

/// Camera pan direction during the reel phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// One direction-estimation strategy.
///
/// `update` consumes the current frame when the strategy is pixel-based;
/// memory-based strategies ignore it. Inside the deadband the tracker
/// retains its previous direction rather than reporting none (hysteresis).
pub trait DirectionTracker: Send {
    /// Feeds one tick of input and returns the current direction estimate.
    fn update(&mut self, gray: Option<&GrayImage>) -> Option<Direction>;

    /// Whether the camera is considered actively panning.
    fn moving(&self) -> bool;

    /// Whether the strategy's data source is usable this session.
    fn connected(&self) -> bool {
        true
    }

    /// Attempts to (re)establish the data source. Pixel-based strategies
    /// have nothing to do here.
    fn ensure_connected(&mut self) -> bool {
        true
    }

    /// Clears all accumulated state.
    fn reset(&mut self);
}
