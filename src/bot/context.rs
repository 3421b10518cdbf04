//! Per-session state for the phase machine.
//!
//! All mutable state lives here, grouped by concern, so each phase handler
//! declares what it touches and the transitions can clear exactly the
//! state that must not leak across phases.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::geometry::Rect;
use crate::track::{Direction, SliderTracker};

/// The automation phases, in the order a normal catch goes through them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Bot inactive; no frames are processed.
    #[default]
    Idle,
    /// Locating the slider bar on screen and measuring its travel range.
    Calibrate,
    /// Watching the slider and timing the cast tap.
    Cast,
    /// Waiting for the bite (bubble burst) and striking.
    Strike,
    /// Counter-steering against the fish until it lands or escapes.
    Reel,
    /// Post-catch: take dialog, pauses, and the return to casting.
    End,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Calibrate => "calibrate",
            Phase::Cast => "cast",
            Phase::Strike => "strike",
            Phase::Reel => "reel",
            Phase::End => "end",
        }
    }
}

/// Screen locations the current session has locked onto.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetectionGeometry {
    /// The slider bar, from calibration or the saved rect.
    pub bar: Option<Rect>,
    /// The green target zone, locked once per cast.
    pub zone: Option<Rect>,
    /// The watch region around the bobber (enclosing square when found,
    /// expanded icon rect otherwise).
    pub bobber: Option<Rect>,
    /// The take dialog, when last seen.
    pub take: Option<Rect>,
}

/// Detector and tracker state accumulated across ticks.
#[derive(Debug, Default)]
pub struct TrackerState {
    /// Slider position samples for velocity estimation.
    pub slider: SliderTracker,
    /// Circle count inside the bobber square before any bite.
    pub baseline_circles: Option<usize>,
    /// The strike tap has been sent for this bite.
    pub strike_pressed: bool,
    /// The take dialog has been clicked this catch.
    pub take_clicked: bool,
    /// Consecutive cast ticks without a visible slider.
    pub no_slider_ticks: u32,
    /// The minigame panel (squares row) has been seen this cast.
    pub panel_found: bool,
    // Calibration bookkeeping.
    /// Leftmost slider pixel seen while calibrating.
    pub observed_left: Option<i32>,
    /// Rightmost slider pixel seen while calibrating.
    pub observed_right: Option<i32>,
    /// Slider center on the previous calibration tick.
    pub prev_slider_x: Option<i32>,
    /// Slider travel direction on the previous calibration tick.
    pub slider_dir: Option<Direction>,
    /// Direction reversals observed so far.
    pub bounce_count: u32,
}

impl TrackerState {
    /// Clears the cast-phase locks (zone, panel, velocity samples).
    pub fn reset_cast(&mut self) {
        self.slider.reset();
        self.no_slider_ticks = 0;
        self.panel_found = false;
    }

    /// Clears the calibration sweep bookkeeping.
    pub fn reset_calibration(&mut self) {
        self.observed_left = None;
        self.observed_right = None;
        self.prev_slider_x = None;
        self.slider_dir = None;
        self.bounce_count = 0;
    }
}

/// Keys the bot is currently holding down.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputState {
    /// Scan code of the held reel key, if any. At most one key is ever
    /// held; releasing it is the first step of every phase transition.
    pub held: Option<u16>,
}

/// Everything one activation of the bot accumulates.
pub struct SessionContext {
    pub phase: Phase,
    /// When the current phase was entered.
    pub phase_entered: Instant,
    pub geometry: DetectionGeometry,
    pub trackers: TrackerState,
    pub input: InputState,
    /// Deliberate do-nothing window (post-take animation).
    pub pause_until: Option<Instant>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            phase_entered: Instant::now(),
            geometry: DetectionGeometry::default(),
            trackers: TrackerState::default(),
            input: InputState::default(),
            pause_until: None,
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the bot's state for display, refreshed once per tick.
#[derive(Clone, Debug, Default)]
pub struct BotStatus {
    pub phase: Phase,
    pub bar: Option<Rect>,
    pub zone: Option<Rect>,
    pub slider_x: Option<i32>,
    pub pred_x: Option<i32>,
    pub bobber: Option<Rect>,
    pub take: Option<Rect>,
    pub direction: Option<Direction>,
    pub bubbles: Option<usize>,
    pub pause_remaining_ms: u64,
    pub calibrated: bool,
    pub memory_connected: bool,
}

/// Shared status slot between the bot thread and the caller.
pub type StatusHandle = Arc<Mutex<BotStatus>>;
