//! Automation core for the in-game fishing minigame.
//!
//! The core samples frames of the game window, locates the minigame UI
//! (slider bar, green zone, bobber, take dialog) through template
//! correlation and color analysis, cross-checks camera motion against
//! values read from the game process's memory, and drives a phase state
//! machine that emits timed keyboard/mouse input.
//!
//! Everything OS-specific (frame capture, `SendInput`, process memory,
//! window lookup) sits behind traits so the detection, tracking, and
//! phase logic stay testable on any host.

pub mod bot;
pub mod capture;
pub mod config;
pub mod detect;
pub mod geometry;
pub mod input;
pub mod memory;
pub mod track;

pub use bot::{BotHandle, BotStatus, Phase};
pub use geometry::{DetectionResult, Rect};
