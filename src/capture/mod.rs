//! Frame acquisition and window geometry.
//!
//! The automation loop never blocks on capture: the frame source keeps a
//! single slot with the most recent frame (last-frame-wins, no queueing)
//! and ticks without a fresh frame are simply skipped.

#[cfg(windows)]
pub mod wgc;
#[cfg(windows)]
pub mod window;

#[cfg(windows)]
pub use wgc::CaptureSource;
#[cfg(windows)]
pub use window::GameWindow;

use crate::detect::Frame;
use crate::geometry::Rect;

/// Supplier of the most recent captured frame of the game's client area.
pub trait FrameSource: Send {
    /// Starts the capture backend if it is not already running.
    fn ensure_running(&mut self);

    /// The latest frame, or `None` when no frame has arrived yet.
    fn latest_frame(&mut self) -> Option<Frame>;
}

/// Lookup of the target window's client-area rectangle in screen
/// coordinates. `None` means the game is not running.
pub trait WindowGeometry: Send {
    fn window_rect(&mut self) -> Option<Rect>;
}
