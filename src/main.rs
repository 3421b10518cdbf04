use anyhow::Result;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run()
}

#[cfg(windows)]
fn run() -> Result<()> {
    use anyhow::Context;
    use reelbot::bot::engine::{BarLocator, Engine, SavedBar, TemplateBar};
    use reelbot::bot::runner;
    use reelbot::capture::{CaptureSource, GameWindow};
    use reelbot::config::CalibrationStore;
    use reelbot::detect::TemplateSet;
    use reelbot::input::SendInputSynthesizer;
    use reelbot::memory::process::GameProcess;
    use reelbot::memory::MemoryHandle;
    use reelbot::track::{DirectionTracker, FlowTracker, HeadingTracker};
    use std::time::Duration;

    let template_dir = std::env::current_exe()
        .context("locating executable")?
        .parent()
        .map(|p| p.join("templates"))
        .context("executable has no parent directory")?;
    let templates = TemplateSet::load(&template_dir)?;

    let store = CalibrationStore::default_location();
    log::info!("Calibration file: {}", store.path().display());

    let locator: Box<dyn BarLocator> = match store.bar_rect() {
        Some(rect) => {
            log::info!("Using saved bar rect {:?}", rect);
            Box::new(SavedBar::new(Some(rect)))
        }
        None => {
            log::info!("No saved bar rect; will calibrate on screen");
            Box::new(TemplateBar::new())
        }
    };

    // Camera heading from process memory when the game is reachable,
    // otherwise pixel flow from the frames themselves.
    let direction: Box<dyn DirectionTracker> = match GameProcess::open() {
        Ok(process) => {
            log::info!("Game process opened; using memory heading");
            Box::new(HeadingTracker::new(Box::new(MemoryHandle::new(process))))
        }
        Err(e) => {
            log::warn!("Process memory unavailable ({e:#}); using optical flow");
            Box::new(FlowTracker::new())
        }
    };

    let engine = Engine::new(
        SendInputSynthesizer::new(),
        templates,
        store,
        locator,
        direction,
    );
    let handle = runner::spawn(engine, CaptureSource::new(), GameWindow::new());
    handle.activate();
    log::info!("Bot active. Ctrl+C to quit.");

    loop {
        std::thread::sleep(Duration::from_secs(5));
        let s = handle.status();
        log::info!(
            "phase={} slider={:?} pred={:?} dir={:?} bubbles={:?} mem={}",
            s.phase.name(),
            s.slider_x,
            s.pred_x,
            s.direction.map(|d| d.as_str()),
            s.bubbles,
            s.memory_connected,
        );
    }
}

#[cfg(not(windows))]
fn run() -> Result<()> {
    anyhow::bail!("this program drives a Windows game and only runs on Windows");
}
