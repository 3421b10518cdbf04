//! The phase state machine.
//!
//! One engine drives the whole catch cycle. Phase handlers read the
//! current frame through the detectors, mutate the session context, and
//! request transitions; `enter_phase` releases any held key and clears the
//! state that must not survive the transition.
//!
//! The engine holds no OS handles. Input, direction sensing, and the bar
//! location policy are injected, so the full cycle runs in tests against
//! synthetic frames.

use anyhow::Result;
use image::GrayImage;
use std::time::{Duration, Instant};

use crate::config::{CalibrationStore, Tuning};
use crate::detect::{
    count_circles, find_enclosing_square, find_squares_below, match_template, to_gray,
    track_color_zone, track_slider_bounds, track_slider_x, Frame, TemplateSet,
};
use crate::geometry::Rect;
use crate::input::{scan_name, InputSynthesizer, SC_A, SC_D, SC_SPACE};
use crate::track::{Direction, DirectionTracker};

use super::context::{BotStatus, Phase, SessionContext, StatusHandle};

/// Horizontal slack added around a located bar header before calibration
/// narrows the rect to the observed slider travel.
const CALIBRATE_SPAN: i32 = 700;
/// Slider direction reversals to observe before trusting the travel range.
const CALIBRATE_BOUNCES: u32 = 5;
/// Slider movement below this many pixels per tick is jitter, not travel.
const CALIBRATE_JITTER: i32 = 2;
/// Lenient bar-header score for the panel-presence check. The header is
/// partly covered by the moving slider, so this is far looser than the
/// calibration search.
const PANEL_BAR_THRESHOLD: f32 = 0.55;
/// Settling time at the start of the end phase before any probing.
const END_GRACE: Duration = Duration::from_secs(2);
/// Pause after clicking the take dialog (catch animation).
const TAKE_PAUSE: Duration = Duration::from_secs(3);
/// End-phase age after which the slider is probed directly, covering
/// escapes that never show a take dialog.
const ESCAPE_PROBE: Duration = Duration::from_secs(6);

/// Policy for obtaining the slider bar rectangle.
pub trait BarLocator: Send {
    /// The bar rectangle, if known.
    fn bar(&self) -> Option<Rect>;

    /// Records a calibrated rectangle.
    fn set_bar(&mut self, rect: Rect);

    /// Whether an on-screen calibration pass must run first.
    fn needs_calibration(&self) -> bool;
}

/// Uses a previously calibrated rectangle as-is and never recalibrates.
pub struct SavedBar {
    rect: Option<Rect>,
}

impl SavedBar {
    pub fn new(rect: Option<Rect>) -> Self {
        Self { rect }
    }
}

impl BarLocator for SavedBar {
    fn bar(&self) -> Option<Rect> {
        self.rect
    }

    fn set_bar(&mut self, rect: Rect) {
        self.rect = Some(rect);
    }

    fn needs_calibration(&self) -> bool {
        false
    }
}

/// Locates the bar on screen via the calibration phase before the first
/// cast, then behaves like a saved rect.
#[derive(Default)]
pub struct TemplateBar {
    rect: Option<Rect>,
}

impl TemplateBar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BarLocator for TemplateBar {
    fn bar(&self) -> Option<Rect> {
        self.rect
    }

    fn set_bar(&mut self, rect: Rect) {
        self.rect = Some(rect);
    }

    fn needs_calibration(&self) -> bool {
        self.rect.is_none()
    }
}

/// Whether a predicted slider position warrants the cast tap.
///
/// The prediction must be inside the zone, and not in the trailing part of
/// it along the travel direction: a slider entering from the left with a
/// prediction near the right edge will have left the zone again by the
/// time the game registers the tap. With no measured velocity the whole
/// zone is acceptable.
pub fn zone_accepts(zone: Rect, pred_x: f32, velocity: f64, fraction: f32) -> bool {
    let (l, r) = (zone.x as f32, zone.right() as f32);
    if pred_x < l || pred_x > r {
        return false;
    }
    if velocity > 0.0 {
        pred_x <= l + (r - l) * fraction
    } else if velocity < 0.0 {
        pred_x >= r - (r - l) * fraction
    } else {
        true
    }
}

/// The phase state machine. `I` is the input backend.
pub struct Engine<I: InputSynthesizer> {
    input: I,
    templates: TemplateSet,
    store: CalibrationStore,
    tuning: Tuning,
    /// Prediction horizon for the cast decision.
    pred: Duration,
    locator: Box<dyn BarLocator>,
    direction: Box<dyn DirectionTracker>,
    ctx: SessionContext,
    last_dir: Option<Direction>,
    status: BotStatus,
    shared: StatusHandle,
}

impl<I: InputSynthesizer> Engine<I> {
    pub fn new(
        input: I,
        templates: TemplateSet,
        store: CalibrationStore,
        locator: Box<dyn BarLocator>,
        direction: Box<dyn DirectionTracker>,
    ) -> Self {
        let tuning = store.tuning();
        let pred = Duration::from_millis(store.prediction_ms());
        log::info!(
            "Engine ready: pred={}ms, calibration {}",
            pred.as_millis(),
            if locator.needs_calibration() {
                "required"
            } else {
                "saved"
            }
        );
        Self {
            input,
            templates,
            store,
            tuning,
            pred,
            locator,
            direction,
            ctx: SessionContext::new(),
            last_dir: None,
            status: BotStatus::default(),
            shared: StatusHandle::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.ctx.phase
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.shared.clone()
    }

    /// Sleep between ticks for the current phase. The fast phases watch a
    /// moving slider; the slow ones only wait for dialogs.
    pub fn tick_period(&self) -> Duration {
        match self.ctx.phase {
            Phase::Calibrate | Phase::Cast => Duration::from_millis(20),
            Phase::Reel => Duration::from_millis(50),
            Phase::Strike | Phase::End => Duration::from_millis(100),
            Phase::Idle => Duration::from_millis(200),
        }
    }

    /// Starts a session: reconnects the direction source and picks the
    /// first working phase.
    pub fn activate(&mut self) {
        if !self.direction.ensure_connected() {
            log::warn!("Direction source unavailable; reel detection degraded");
        }
        let first = if self.locator.needs_calibration() {
            Phase::Calibrate
        } else {
            Phase::Cast
        };
        self.enter_phase(first);
    }

    /// Stops the session, releasing any held key.
    pub fn deactivate(&mut self) {
        self.enter_phase(Phase::Idle);
        self.ctx.geometry = Default::default();
        self.ctx.trackers.reset_cast();
        self.ctx.trackers.reset_calibration();
        self.ctx.pause_until = None;
        self.direction.reset();
        self.last_dir = None;
        self.publish();
    }

    /// Processes one frame. `window` is the client area in screen
    /// coordinates, used to place clicks; detection works without it.
    pub fn tick(&mut self, frame: &Frame, window: Option<Rect>) {
        let gray = to_gray(frame);
        let result = match self.ctx.phase {
            Phase::Idle => Ok(()),
            Phase::Calibrate => self.run_calibrate(frame, &gray),
            Phase::Cast => self.run_cast(frame, &gray),
            Phase::Strike => self.run_strike(&gray),
            Phase::Reel => self.run_reel(frame, &gray, window),
            Phase::End => self.run_end(frame, &gray, window),
        };
        if let Err(e) = result {
            log::warn!("{} tick failed: {e:#}", self.ctx.phase.name());
        }
        self.publish();
    }

    fn enter_phase(&mut self, next: Phase) {
        if let Some(held) = self.ctx.input.held.take() {
            self.input.key_up(held);
        }
        log::info!("Phase {} -> {}", self.ctx.phase.name(), next.name());
        self.ctx.phase = next;
        self.ctx.phase_entered = Instant::now();
        match next {
            Phase::Calibrate => {
                self.ctx.geometry.bar = None;
                self.ctx.trackers.reset_calibration();
            }
            Phase::Cast => {
                self.ctx.geometry.zone = None;
                self.ctx.trackers.reset_cast();
                self.direction.reset();
                self.last_dir = None;
                self.status.slider_x = None;
                self.status.pred_x = None;
                self.status.bubbles = None;
            }
            Phase::Strike => {
                self.ctx.geometry.bobber = None;
                self.ctx.trackers.baseline_circles = None;
                self.ctx.trackers.strike_pressed = false;
            }
            Phase::End => {
                self.ctx.trackers.take_clicked = false;
                self.ctx.pause_until = None;
            }
            Phase::Reel | Phase::Idle => {}
        }
    }

    /// Calibration: find the bar header, then watch the slider sweep until
    /// enough bounces pin down the travel range.
    fn run_calibrate(&mut self, frame: &Frame, gray: &GrayImage) -> Result<()> {
        let Some(bar) = self.ctx.geometry.bar else {
            // Bar header search, restricted to the bottom half where the
            // minigame panel renders.
            let (w, h) = (frame.width() as i32, frame.height() as i32);
            let region = Rect::new(0, h / 2, w, h - h / 2);
            let Some(found) =
                match_template(gray, &self.templates.green_bar, region, self.tuning.bar_threshold)
            else {
                return Ok(());
            };
            let wide = Rect::new(
                found.rect.x - CALIBRATE_SPAN,
                found.rect.y,
                found.rect.w + 2 * CALIBRATE_SPAN,
                found.rect.h,
            );
            let bar = wide.clipped(frame.width(), frame.height()).unwrap_or(found.rect);
            log::info!("Bar header at {:?} (score {:.2}), sweeping {:?}", found.rect, found.score, bar);
            self.ctx.geometry.bar = Some(bar);
            return Ok(());
        };

        let Some((cx, lx, rx)) = track_slider_bounds(frame, bar) else {
            return Ok(());
        };
        let t = &mut self.ctx.trackers;
        t.observed_left = Some(t.observed_left.map_or(lx, |v| v.min(lx)));
        t.observed_right = Some(t.observed_right.map_or(rx, |v| v.max(rx)));

        if let Some(prev) = t.prev_slider_x {
            let delta = cx - prev;
            if delta.abs() >= CALIBRATE_JITTER {
                let dir = if delta > 0 { Direction::Right } else { Direction::Left };
                if t.slider_dir.is_some_and(|d| d != dir) {
                    t.bounce_count += 1;
                    log::debug!("Calibration bounce {} at x={}", t.bounce_count, cx);
                }
                t.slider_dir = Some(dir);
            }
        }
        t.prev_slider_x = Some(cx);
        self.status.slider_x = Some(cx);

        if t.bounce_count >= CALIBRATE_BOUNCES {
            let (left, right) = (t.observed_left.unwrap_or(lx), t.observed_right.unwrap_or(rx));
            let refined = Rect::new(left, bar.y, right - left, bar.h);
            log::info!("Calibrated bar {:?} after {} bounces", refined, t.bounce_count);
            self.store.save_bar_rect(refined)?;
            self.locator.set_bar(refined);
            self.enter_phase(Phase::Cast);
        }
        Ok(())
    }

    /// Cast: wait for the panel, lock the zone, time the tap.
    fn run_cast(&mut self, frame: &Frame, gray: &GrayImage) -> Result<()> {
        let Some(bar) = self.locator.bar() else {
            return Ok(());
        };
        self.ctx.geometry.bar = Some(bar);

        if !self.ctx.trackers.panel_found {
            let header = match_template(gray, &self.templates.green_bar, bar, PANEL_BAR_THRESHOLD);
            if header.is_none() && find_squares_below(gray, bar).is_empty() {
                return Ok(());
            }
            self.ctx.trackers.panel_found = true;
            log::info!("Minigame panel visible");
        }

        let Some(slider_x) = track_slider_x(frame, bar) else {
            self.ctx.trackers.no_slider_ticks += 1;
            if self.ctx.trackers.no_slider_ticks >= self.tuning.no_slider_limit {
                log::info!(
                    "No slider for {} ticks; resetting cast locks",
                    self.ctx.trackers.no_slider_ticks
                );
                self.ctx.geometry.zone = None;
                self.ctx.trackers.reset_cast();
            }
            return Ok(());
        };
        self.ctx.trackers.no_slider_ticks = 0;
        self.status.slider_x = Some(slider_x);

        let t = self.ctx.phase_entered.elapsed().as_secs_f64();
        self.ctx.trackers.slider.push(t, slider_x as f64);

        // The zone is locked only while the slider is clear of it, so the
        // needle's white pixels never bleed into the zone's bounding box.
        if self.ctx.geometry.zone.is_none() {
            if let Some(zone) = track_color_zone(frame, bar) {
                let margin = self.tuning.zone_lock_margin;
                if slider_x < zone.x - margin || slider_x > zone.right() + margin {
                    log::info!("Zone locked: {:?}", zone);
                    self.ctx.geometry.zone = Some(zone);
                }
            }
        }
        let Some(zone) = self.ctx.geometry.zone else {
            return Ok(());
        };

        let velocity = self.ctx.trackers.slider.velocity();
        let pred_x = bar.clamp_x(slider_x as f32 + (velocity * self.pred.as_secs_f64()) as f32);
        self.status.pred_x = Some(pred_x as i32);

        if zone_accepts(zone, pred_x, velocity, self.tuning.zone_accept_fraction) {
            log::info!(
                "Cast tap: slider={} pred={:.0} v={:.0} zone={:?}",
                slider_x,
                pred_x,
                velocity,
                zone
            );
            self.input.tap(SC_SPACE);
            self.enter_phase(Phase::Strike);
        }
        Ok(())
    }

    /// Strike: watch the bobber square for a bubble burst, then hook.
    fn run_strike(&mut self, gray: &GrayImage) -> Result<()> {
        if self.ctx.geometry.bobber.is_none() {
            // The bobber lands right of center, below the top third.
            let (w, h) = (gray.width() as i32, gray.height() as i32);
            let region = Rect::new(w / 4, h / 3, w - w / 4, h - h / 3);
            let Some(found) =
                match_template(gray, &self.templates.bobber, region, self.tuning.bobber_threshold)
            else {
                return Ok(());
            };
            let icon = found.rect;
            let (watch, baseline) = match find_enclosing_square(gray, icon, 0) {
                Some(hit) => hit,
                None => {
                    // No clean square contour; watch an area around the
                    // icon instead and count from there.
                    let pad = icon.w.max(icon.h);
                    let watch = Rect::new(icon.x - pad, icon.y - pad, icon.w + 2 * pad, icon.h + 2 * pad)
                        .clipped(gray.width(), gray.height())
                        .unwrap_or(icon);
                    (watch, count_circles(gray, watch))
                }
            };
            log::info!("Watching bobber at {:?}, baseline {} circles", watch, baseline);
            self.ctx.geometry.bobber = Some(watch);
            self.ctx.trackers.baseline_circles = Some(baseline);
            return Ok(());
        }

        if !self.ctx.trackers.strike_pressed {
            if let Some(watch) = self.ctx.geometry.bobber {
                let bubbles = count_circles(gray, watch);
                self.status.bubbles = Some(bubbles);
                let baseline = self.ctx.trackers.baseline_circles.unwrap_or(0);
                if bubbles > baseline + self.tuning.bubble_margin {
                    log::info!("Bubble burst: {} circles over baseline {}", bubbles, baseline);
                    self.input.tap(SC_SPACE);
                    self.ctx.trackers.strike_pressed = true;
                }
            }
            return Ok(());
        }

        // Only after the hook is set does the camera chasing the fish mean
        // the fight has started.
        let dir = self.direction.update(Some(gray));
        self.last_dir = dir;
        if self.direction.connected() && self.direction.moving() {
            self.enter_phase(Phase::Reel);
        }
        Ok(())
    }

    /// Reel: hold the counter-steer key against the camera pan; the take
    /// dialog or a quiet camera ends the fight.
    fn run_reel(&mut self, frame: &Frame, gray: &GrayImage, window: Option<Rect>) -> Result<()> {
        let dir = self.direction.update(Some(gray));
        self.last_dir = dir;

        if !self.direction.connected() {
            log::warn!("Direction source lost during reel");
            self.enter_phase(Phase::End);
            return Ok(());
        }

        if let Some(found) = self.find_take_dialog(frame, gray) {
            self.click_take(found, window);
            self.enter_phase(Phase::End);
            self.ctx.trackers.take_clicked = true;
            self.ctx.pause_until = Some(Instant::now() + TAKE_PAUSE);
            return Ok(());
        }

        if !self.direction.moving() {
            log::info!("Camera stable; reel over");
            self.enter_phase(Phase::End);
            return Ok(());
        }

        // Counter-steer: camera panning right means the fish pulls left.
        if let Some(dir) = dir {
            let desired = match dir {
                Direction::Right => SC_A,
                Direction::Left => SC_D,
            };
            if self.ctx.input.held != Some(desired) {
                if let Some(held) = self.ctx.input.held.take() {
                    self.input.key_up(held);
                }
                self.input.key_down(desired);
                self.ctx.input.held = Some(desired);
                log::info!("Reeling {}, holding {}", dir.as_str(), scan_name(desired));
            }
        }
        Ok(())
    }

    /// End: grace, take dialog, pause, and the hunt for the next cast.
    fn run_end(&mut self, frame: &Frame, gray: &GrayImage, window: Option<Rect>) -> Result<()> {
        if let Some(until) = self.ctx.pause_until {
            if Instant::now() < until {
                return Ok(());
            }
            self.ctx.pause_until = None;
            if self.ctx.trackers.take_clicked {
                self.enter_phase(Phase::Cast);
                return Ok(());
            }
        }

        let age = self.ctx.phase_entered.elapsed();
        if age < END_GRACE {
            return Ok(());
        }

        if !self.ctx.trackers.take_clicked {
            if let Some(found) = self.find_take_dialog(frame, gray) {
                self.click_take(found, window);
                self.ctx.trackers.take_clicked = true;
                self.ctx.pause_until = Some(Instant::now() + TAKE_PAUSE);
                return Ok(());
            }
        }

        if age >= ESCAPE_PROBE {
            // No dialog ever showed: the fish escaped, or the catch screen
            // was skipped. The minigame is back once the slider reappears.
            let back = match self.locator.bar() {
                Some(bar) => track_slider_x(frame, bar).is_some(),
                None => {
                    let (w, h) = (frame.width() as i32, frame.height() as i32);
                    let region = Rect::new(0, h / 2, w, h - h / 2);
                    match_template(gray, &self.templates.green_bar, region, self.tuning.bar_threshold)
                        .is_some()
                }
            };
            if back {
                log::info!("Minigame back on screen; casting again");
                self.enter_phase(Phase::Cast);
            }
        }
        Ok(())
    }

    /// Searches the dialog area (center of the screen, upper half biased)
    /// for the take button.
    fn find_take_dialog(&mut self, frame: &Frame, gray: &GrayImage) -> Option<Rect> {
        let (w, h) = (frame.width() as i32, frame.height() as i32);
        let region = Rect::new(w / 5, h / 4, 3 * w / 5, h / 2);
        let found = match_template(gray, &self.templates.take, region, self.tuning.take_threshold)?;
        self.ctx.geometry.take = Some(found.rect);
        Some(found.rect)
    }

    /// Clicks the center of the take button, offset into screen space.
    fn click_take(&mut self, take: Rect, window: Option<Rect>) {
        let Some(window) = window else {
            log::warn!("Take dialog found but window position unknown; skipping click");
            return;
        };
        let (cx, cy) = take.center();
        log::info!("Clicking take at frame ({}, {})", cx, cy);
        self.input.click_at(window.x + cx, window.y + cy);
    }

    fn publish(&mut self) {
        self.status.phase = self.ctx.phase;
        self.status.bar = self.ctx.geometry.bar.or_else(|| self.locator.bar());
        self.status.zone = self.ctx.geometry.zone;
        self.status.bobber = self.ctx.geometry.bobber;
        self.status.take = self.ctx.geometry.take;
        self.status.direction = self.last_dir;
        self.status.calibrated = self.locator.bar().is_some();
        self.status.memory_connected = self.direction.connected();
        self.status.pause_remaining_ms = self
            .ctx
            .pause_until
            .map(|u| u.saturating_duration_since(Instant::now()).as_millis() as u64)
            .unwrap_or(0);
        if let Ok(mut guard) = self.shared.lock() {
            *guard = self.status.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    const DARK: Rgba<u8> = Rgba([20, 20, 24, 255]);
    const GREEN: Rgba<u8> = Rgba([40, 220, 60, 255]);
    const WHITE: Rgba<u8> = Rgba([250, 250, 250, 255]);

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Down(u16),
        Up(u16),
        Tap(u16),
        Click(i32, i32),
    }

    #[derive(Default)]
    struct RecordingInput {
        events: Vec<Event>,
    }

    impl InputSynthesizer for RecordingInput {
        fn key_down(&mut self, scan: u16) {
            self.events.push(Event::Down(scan));
        }

        fn key_up(&mut self, scan: u16) {
            self.events.push(Event::Up(scan));
        }

        fn tap(&mut self, scan: u16) {
            self.events.push(Event::Tap(scan));
        }

        fn click_at(&mut self, x: i32, y: i32) {
            self.events.push(Event::Click(x, y));
        }
    }

    #[derive(Default)]
    struct DirState {
        dir: Option<Direction>,
        moving: bool,
        connected: bool,
    }

    /// Direction double whose readings the test can change between ticks.
    #[derive(Clone)]
    struct TestDirection(Arc<Mutex<DirState>>);

    impl TestDirection {
        fn new(connected: bool) -> Self {
            Self(Arc::new(Mutex::new(DirState {
                connected,
                ..Default::default()
            })))
        }

        fn set(&self, dir: Option<Direction>, moving: bool) {
            let mut s = self.0.lock().unwrap();
            s.dir = dir;
            s.moving = moving;
        }

        fn set_connected(&self, connected: bool) {
            self.0.lock().unwrap().connected = connected;
        }
    }

    impl DirectionTracker for TestDirection {
        fn update(&mut self, _gray: Option<&GrayImage>) -> Option<Direction> {
            self.0.lock().unwrap().dir
        }

        fn moving(&self) -> bool {
            self.0.lock().unwrap().moving
        }

        fn connected(&self) -> bool {
            self.0.lock().unwrap().connected
        }

        fn ensure_connected(&mut self) -> bool {
            self.connected()
        }

        fn reset(&mut self) {}
    }

    fn checker(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([230])
            } else {
                Luma([25])
            }
        })
    }

    fn templates() -> TemplateSet {
        TemplateSet {
            green_bar: checker(8),
            bobber: checker(8),
            take: checker(8),
        }
    }

    fn build(
        tmp: &TempDir,
        locator: Box<dyn BarLocator>,
        dir: TestDirection,
        pred_ms: u64,
    ) -> Engine<RecordingInput> {
        let store = CalibrationStore::new(tmp.path().join("calibration.json"));
        store.save_prediction_ms(pred_ms).unwrap();
        Engine::new(
            RecordingInput::default(),
            templates(),
            store,
            locator,
            Box::new(dir),
        )
    }

    fn dark_frame(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, DARK)
    }

    fn paint(frame: &mut RgbaImage, r: Rect, c: Rgba<u8>) {
        for y in r.y..r.bottom() {
            for x in r.x..r.right() {
                frame.put_pixel(x as u32, y as u32, c);
            }
        }
    }

    fn paint_disc(frame: &mut RgbaImage, cx: i32, cy: i32, r: i32) {
        for y in (cy - r)..=(cy + r) {
            for x in (cx - r)..=(cx + r) {
                if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                    frame.put_pixel(x as u32, y as u32, WHITE);
                }
            }
        }
    }

    fn paste_gray(frame: &mut RgbaImage, x0: i32, y0: i32, img: &GrayImage) {
        for (x, y, p) in img.enumerate_pixels() {
            let v = p[0];
            frame.put_pixel(x0 as u32 + x, y0 as u32 + y, Rgba([v, v, v, 255]));
        }
    }

    #[test]
    fn test_zone_accepts_leading_fraction() {
        let zone = Rect::new(40, 0, 20, 10);
        // Entering from the left: only the leading 75% is timeable.
        assert!(zone_accepts(zone, 54.0, 120.0, 0.75));
        assert!(!zone_accepts(zone, 56.0, 120.0, 0.75));
        // Entering from the right mirrors it.
        assert!(zone_accepts(zone, 50.0, -120.0, 0.75));
        assert!(!zone_accepts(zone, 44.0, -120.0, 0.75));
        // Outside the zone entirely.
        assert!(!zone_accepts(zone, 39.0, 120.0, 0.75));
        assert!(!zone_accepts(zone, 61.0, -120.0, 0.75));
    }

    #[test]
    fn test_zone_accepts_full_zone_when_still() {
        // Before any velocity is measured the whole zone counts.
        let zone = Rect::new(40, 0, 20, 10);
        assert!(zone_accepts(zone, 41.0, 0.0, 0.75));
        assert!(zone_accepts(zone, 59.0, 0.0, 0.75));
        assert!(!zone_accepts(zone, 39.0, 0.0, 0.75));
    }

    #[test]
    fn test_cast_locks_zone_then_taps_inside() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let bar = Rect::new(50, 200, 300, 20);
        let mut engine = build(&tmp, Box::new(SavedBar::new(Some(bar))), dir, 0);
        engine.ctx.phase = Phase::Cast;
        engine.ctx.trackers.panel_found = true;

        // Slider far to the right of the zone: the zone may lock, no tap.
        let mut f1 = dark_frame(400, 300);
        paint(&mut f1, Rect::new(90, 200, 40, 20), GREEN);
        paint(&mut f1, Rect::new(240, 200, 4, 20), WHITE);
        engine.tick(&f1, None);
        assert_eq!(engine.ctx.geometry.zone.map(|z| z.x), Some(90));
        assert!(engine.input.events.is_empty());
        assert_eq!(engine.phase(), Phase::Cast);

        // Slider inside the locked zone: exactly one tap, then strike.
        let mut f2 = dark_frame(400, 300);
        paint(&mut f2, Rect::new(90, 200, 40, 20), GREEN);
        paint(&mut f2, Rect::new(100, 200, 4, 20), WHITE);
        engine.tick(&f2, None);
        assert_eq!(engine.input.events, vec![Event::Tap(SC_SPACE)]);
        assert_eq!(engine.phase(), Phase::Strike);
    }

    #[test]
    fn test_cast_without_bar_does_nothing() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir, 0);
        engine.ctx.phase = Phase::Cast;

        let mut frame = dark_frame(400, 300);
        paint(&mut frame, Rect::new(90, 200, 40, 20), GREEN);
        paint(&mut frame, Rect::new(240, 200, 4, 20), WHITE);
        engine.tick(&frame, None);

        assert_eq!(engine.phase(), Phase::Cast);
        assert!(engine.input.events.is_empty());
        assert!(engine.ctx.geometry.zone.is_none());
    }

    #[test]
    fn test_cast_resets_locks_after_sliderless_ticks() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let bar = Rect::new(50, 200, 300, 20);
        let mut engine = build(&tmp, Box::new(SavedBar::new(Some(bar))), dir, 0);
        engine.ctx.phase = Phase::Cast;
        engine.ctx.trackers.panel_found = true;
        engine.ctx.geometry.zone = Some(Rect::new(90, 200, 40, 20));

        let frame = dark_frame(400, 300);
        for _ in 0..49 {
            engine.tick(&frame, None);
        }
        assert!(engine.ctx.geometry.zone.is_some());

        engine.tick(&frame, None);
        assert!(engine.ctx.geometry.zone.is_none());
        assert!(!engine.ctx.trackers.panel_found);
        assert_eq!(engine.phase(), Phase::Cast);
    }

    #[test]
    fn test_strike_finds_bobber_left_of_center() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir, 0);
        engine.ctx.phase = Phase::Strike;

        // Icon between the quarter and half marks of a 400px frame.
        let mut frame = dark_frame(400, 300);
        paste_gray(&mut frame, 120, 150, &checker(8));

        engine.tick(&frame, None);
        let watch = engine.ctx.geometry.bobber.expect("bobber not locked");
        assert!(watch.x <= 120 && watch.right() >= 128);
        assert!(engine.ctx.trackers.baseline_circles.is_some());
        assert!(engine.input.events.is_empty());
    }

    #[test]
    fn test_strike_taps_on_bubble_burst_once() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir.clone(), 0);
        engine.ctx.phase = Phase::Strike;
        engine.ctx.geometry.bobber = Some(Rect::new(150, 100, 100, 100));
        engine.ctx.trackers.baseline_circles = Some(0);

        let mut frame = dark_frame(400, 300);
        paint_disc(&mut frame, 170, 130, 6);
        paint_disc(&mut frame, 200, 150, 6);
        paint_disc(&mut frame, 230, 170, 6);

        engine.tick(&frame, None);
        assert_eq!(engine.input.events, vec![Event::Tap(SC_SPACE)]);
        assert!(engine.ctx.trackers.strike_pressed);
        assert_eq!(engine.phase(), Phase::Strike);

        // Same burst on the next tick must not tap again.
        engine.tick(&frame, None);
        assert_eq!(engine.input.events, vec![Event::Tap(SC_SPACE)]);

        // The camera starting to move hands over to the reel phase.
        dir.set(Some(Direction::Right), true);
        engine.tick(&frame, None);
        assert_eq!(engine.phase(), Phase::Reel);
    }

    #[test]
    fn test_strike_waits_for_tap_before_reeling() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir.clone(), 0);
        engine.ctx.phase = Phase::Strike;
        engine.ctx.geometry.bobber = Some(Rect::new(150, 100, 100, 100));
        engine.ctx.trackers.baseline_circles = Some(0);

        // Camera drift before any bubbles must not start the reel: the
        // hook has not been set yet.
        dir.set(Some(Direction::Right), true);
        engine.tick(&dark_frame(400, 300), None);
        assert_eq!(engine.phase(), Phase::Strike);
        assert!(engine.input.events.is_empty());

        let mut frame = dark_frame(400, 300);
        paint_disc(&mut frame, 170, 130, 6);
        paint_disc(&mut frame, 200, 150, 6);
        paint_disc(&mut frame, 230, 170, 6);

        // Bubbles set the hook; the moving camera then starts the reel.
        engine.tick(&frame, None);
        assert_eq!(engine.input.events, vec![Event::Tap(SC_SPACE)]);
        engine.tick(&frame, None);
        assert_eq!(engine.phase(), Phase::Reel);
    }

    #[test]
    fn test_strike_ignores_bubbles_within_baseline() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir, 0);
        engine.ctx.phase = Phase::Strike;
        engine.ctx.geometry.bobber = Some(Rect::new(150, 100, 100, 100));
        engine.ctx.trackers.baseline_circles = Some(1);

        // Three circles over a baseline of one is exactly the margin, not
        // over it.
        let mut frame = dark_frame(400, 300);
        paint_disc(&mut frame, 170, 130, 6);
        paint_disc(&mut frame, 200, 150, 6);
        paint_disc(&mut frame, 230, 170, 6);

        engine.tick(&frame, None);
        assert!(engine.input.events.is_empty());
        assert!(!engine.ctx.trackers.strike_pressed);
    }

    #[test]
    fn test_reel_counter_steers_and_ends_when_stable() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir.clone(), 0);
        engine.ctx.phase = Phase::Reel;

        let frame = dark_frame(400, 300);

        dir.set(Some(Direction::Right), true);
        engine.tick(&frame, None);
        assert_eq!(engine.input.events, vec![Event::Down(SC_A)]);
        assert_eq!(engine.ctx.input.held, Some(SC_A));

        // Same direction: the key stays held, nothing new is sent.
        engine.tick(&frame, None);
        assert_eq!(engine.input.events, vec![Event::Down(SC_A)]);

        dir.set(Some(Direction::Left), true);
        engine.tick(&frame, None);
        assert_eq!(
            engine.input.events,
            vec![Event::Down(SC_A), Event::Up(SC_A), Event::Down(SC_D)]
        );

        dir.set(Some(Direction::Left), false);
        engine.tick(&frame, None);
        assert_eq!(engine.phase(), Phase::End);
        assert_eq!(engine.ctx.input.held, None);
        assert_eq!(engine.input.events.last(), Some(&Event::Up(SC_D)));
    }

    #[test]
    fn test_reel_ends_when_direction_source_lost() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir.clone(), 0);
        engine.ctx.phase = Phase::Reel;
        dir.set(Some(Direction::Right), true);
        dir.set_connected(false);

        engine.tick(&dark_frame(400, 300), None);
        assert_eq!(engine.phase(), Phase::End);
        assert!(engine.input.events.is_empty());
    }

    #[test]
    fn test_reel_clicks_take_dialog() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir.clone(), 0);
        engine.ctx.phase = Phase::Reel;
        dir.set(Some(Direction::Right), true);

        let mut frame = dark_frame(400, 300);
        paste_gray(&mut frame, 150, 100, &checker(8));
        let window = Rect::new(1000, 500, 400, 300);

        engine.tick(&frame, Some(window));
        assert_eq!(engine.input.events, vec![Event::Click(1154, 604)]);
        assert_eq!(engine.phase(), Phase::End);
        assert!(engine.ctx.trackers.take_clicked);
        assert!(engine.ctx.pause_until.is_some());
    }

    #[test]
    fn test_end_clicks_take_then_returns_to_cast() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir, 0);
        engine.ctx.phase = Phase::End;
        engine.ctx.phase_entered = Instant::now() - Duration::from_secs(3);

        let mut frame = dark_frame(400, 300);
        paste_gray(&mut frame, 150, 100, &checker(8));
        let window = Rect::new(0, 0, 400, 300);

        engine.tick(&frame, Some(window));
        assert_eq!(engine.input.events, vec![Event::Click(154, 104)]);
        assert!(engine.ctx.trackers.take_clicked);

        // Inside the post-take pause nothing happens.
        engine.tick(&frame, Some(window));
        assert_eq!(engine.input.events.len(), 1);
        assert_eq!(engine.phase(), Phase::End);

        // Once the pause lapses the next cast starts.
        engine.ctx.pause_until = Some(Instant::now() - Duration::from_millis(10));
        engine.tick(&frame, Some(window));
        assert_eq!(engine.phase(), Phase::Cast);
        assert_eq!(engine.input.events.len(), 1);
    }

    #[test]
    fn test_end_probes_for_minigame_after_escape() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir, 0);
        engine.ctx.phase = Phase::End;
        engine.ctx.phase_entered = Instant::now() - Duration::from_secs(7);

        // Nothing on screen: stay in the end phase.
        engine.tick(&dark_frame(400, 300), None);
        assert_eq!(engine.phase(), Phase::End);

        // The bar header reappearing in the bottom half means the minigame
        // is back.
        let mut frame = dark_frame(400, 300);
        paste_gray(&mut frame, 100, 250, &checker(8));
        engine.tick(&frame, None);
        assert_eq!(engine.phase(), Phase::Cast);
        assert!(engine.input.events.is_empty());
    }

    #[test]
    fn test_calibration_counts_bounces_and_saves_bar() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let bar = Rect::new(50, 200, 300, 20);
        let mut engine = build(&tmp, Box::new(TemplateBar::new()), dir, 0);
        engine.ctx.phase = Phase::Calibrate;
        engine.ctx.geometry.bar = Some(bar);

        for p in [100, 140, 100, 140, 100, 140, 100] {
            let mut frame = dark_frame(400, 300);
            paint(&mut frame, Rect::new(p, 200, 4, 20), WHITE);
            engine.tick(&frame, None);
        }

        let refined = Rect::new(100, 200, 43, 20);
        assert_eq!(engine.phase(), Phase::Cast);
        assert_eq!(engine.locator.bar(), Some(refined));

        let store = CalibrationStore::new(tmp.path().join("calibration.json"));
        assert_eq!(store.bar_rect(), Some(refined));
    }

    #[test]
    fn test_activate_picks_first_phase_from_locator() {
        let tmp = tempdir().unwrap();
        let bar = Rect::new(50, 200, 300, 20);

        let mut engine = build(
            &tmp,
            Box::new(SavedBar::new(Some(bar))),
            TestDirection::new(true),
            0,
        );
        engine.activate();
        assert_eq!(engine.phase(), Phase::Cast);

        let mut engine = build(&tmp, Box::new(TemplateBar::new()), TestDirection::new(true), 0);
        engine.activate();
        assert_eq!(engine.phase(), Phase::Calibrate);
    }

    #[test]
    fn test_deactivate_releases_held_key() {
        let tmp = tempdir().unwrap();
        let dir = TestDirection::new(true);
        let mut engine = build(&tmp, Box::new(SavedBar::new(None)), dir, 0);
        engine.ctx.phase = Phase::Reel;
        engine.ctx.input.held = Some(SC_A);

        engine.deactivate();
        assert_eq!(engine.input.events, vec![Event::Up(SC_A)]);
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(engine.ctx.geometry.bar.is_none());
    }
}
