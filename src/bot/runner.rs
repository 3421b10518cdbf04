//! The bot thread.
//!
//! `spawn` moves the engine, frame source, and window lookup onto a
//! dedicated thread and returns a `BotHandle`. Activation is a shared
//! flag: flipping it off releases any held key on the next loop pass, so
//! the game is never left with a stuck key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::{FrameSource, WindowGeometry};
use crate::input::InputSynthesizer;

use super::context::{BotStatus, Phase, StatusHandle};
use super::engine::Engine;

/// Idle sleep while the bot is switched off.
const INACTIVE_SLEEP: Duration = Duration::from_millis(200);
/// Wait per attempt for the first frame after starting capture.
const FIRST_FRAME_WAIT: Duration = Duration::from_millis(100);
/// Attempts to see a first frame before activating anyway.
const FIRST_FRAME_TRIES: u32 = 20;

/// Control handle for a running bot thread.
pub struct BotHandle {
    active: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    status: StatusHandle,
    thread: Option<JoinHandle<()>>,
}

impl BotHandle {
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Latest status snapshot published by the bot thread.
    pub fn status(&self) -> BotStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Stops the thread and waits for it to release all input.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BotHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Starts the bot thread. The bot begins deactivated.
pub fn spawn<I, F, W>(mut engine: Engine<I>, mut frames: F, mut window: W) -> BotHandle
where
    I: InputSynthesizer + 'static,
    F: FrameSource + 'static,
    W: WindowGeometry + 'static,
{
    let active = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));
    let status = engine.status_handle();

    let thread = {
        let active = active.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            log::info!("Bot thread started");
            loop {
                if stop.load(Ordering::SeqCst) {
                    engine.deactivate();
                    break;
                }
                if !active.load(Ordering::SeqCst) {
                    if engine.phase() != Phase::Idle {
                        engine.deactivate();
                    }
                    std::thread::sleep(INACTIVE_SLEEP);
                    continue;
                }

                if engine.phase() == Phase::Idle {
                    frames.ensure_running();
                    wait_for_first_frame(&mut frames);
                    engine.activate();
                }

                frames.ensure_running();
                let Some(frame) = frames.latest_frame() else {
                    std::thread::sleep(FIRST_FRAME_WAIT);
                    continue;
                };
                let win = window.window_rect();
                engine.tick(&frame, win);
                std::thread::sleep(engine.tick_period());
            }
            log::info!("Bot thread stopped");
        })
    };

    BotHandle {
        active,
        stop,
        status,
        thread: Some(thread),
    }
}

fn wait_for_first_frame<F: FrameSource>(frames: &mut F) {
    for _ in 0..FIRST_FRAME_TRIES {
        if frames.latest_frame().is_some() {
            return;
        }
        std::thread::sleep(FIRST_FRAME_WAIT);
    }
    log::warn!("No frame arrived yet; is the game window visible?");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::engine::SavedBar;
    use crate::config::CalibrationStore;
    use crate::detect::{Frame, TemplateSet};
    use crate::geometry::Rect;
    use crate::track::{Direction, DirectionTracker};
    use image::{GrayImage, Luma, RgbaImage};
    use tempfile::tempdir;

    struct NullInput;

    impl InputSynthesizer for NullInput {
        fn key_down(&mut self, _scan: u16) {}
        fn key_up(&mut self, _scan: u16) {}
        fn tap(&mut self, _scan: u16) {}
        fn click_at(&mut self, _x: i32, _y: i32) {}
    }

    struct StillCamera;

    impl DirectionTracker for StillCamera {
        fn update(&mut self, _gray: Option<&GrayImage>) -> Option<Direction> {
            None
        }

        fn moving(&self) -> bool {
            false
        }

        fn reset(&mut self) {}
    }

    struct StaticFrames(Frame);

    impl FrameSource for StaticFrames {
        fn ensure_running(&mut self) {}

        fn latest_frame(&mut self) -> Option<Frame> {
            Some(self.0.clone())
        }
    }

    struct NoWindow;

    impl WindowGeometry for NoWindow {
        fn window_rect(&mut self) -> Option<Rect> {
            None
        }
    }

    fn test_engine(dir: &tempfile::TempDir) -> Engine<NullInput> {
        let templates = TemplateSet {
            green_bar: GrayImage::from_pixel(8, 8, Luma([128])),
            bobber: GrayImage::from_pixel(8, 8, Luma([128])),
            take: GrayImage::from_pixel(8, 8, Luma([128])),
        };
        let store = CalibrationStore::new(dir.path().join("calibration.json"));
        Engine::new(
            NullInput,
            templates,
            store,
            Box::new(SavedBar::new(Some(Rect::new(50, 200, 300, 20)))),
            Box::new(StillCamera),
        )
    }

    #[test]
    fn test_activate_deactivate_round_trip() {
        let dir = tempdir().unwrap();
        let frame = RgbaImage::from_pixel(400, 300, image::Rgba([20, 20, 24, 255]));
        let handle = spawn(test_engine(&dir), StaticFrames(frame), NoWindow);

        assert!(!handle.is_active());
        assert_eq!(handle.status().phase, Phase::Idle);

        handle.activate();
        // The thread needs a moment to pick the flag up and tick.
        for _ in 0..50 {
            if handle.status().phase == Phase::Cast {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(handle.status().phase, Phase::Cast);

        handle.deactivate();
        for _ in 0..50 {
            if handle.status().phase == Phase::Idle {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(handle.status().phase, Phase::Idle);

        handle.shutdown();
    }
}
