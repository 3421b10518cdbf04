//! Calibration store and tuning parameters.
//!
//! The calibration file is a flat JSON object shared with other tools, so
//! writes merge field-by-field instead of overwriting the whole file. This
//! core owns two keys: the locked slider-bar rectangle and the prediction
//! horizon used when deciding the cast tap.
//!
//! `Tuning` collects the empirically calibrated thresholds (match scores,
//! color ranges, deadbands). They are tied to one game build's rendering;
//! the defaults here are the measured values, overridable from the same
//! JSON file under the `fishing_tuning` key.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::geometry::Rect;

/// Calibration file key for the slider-bar rectangle (`[x, y, w, h]`).
const KEY_BAR_RECT: &str = "fishing_bar_rect";
/// Calibration file key for the prediction horizon in milliseconds.
const KEY_PRED_MS: &str = "fishing_pred_ms";
/// Calibration file key for the tuning block.
const KEY_TUNING: &str = "fishing_tuning";

/// Default prediction horizon: how far ahead the slider position is
/// extrapolated before testing zone membership.
const DEFAULT_PRED_MS: u64 = 120;

/// Read/write access to the shared calibration file.
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default per-user location.
    pub fn default_location() -> Self {
        let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join("reelbot").join("calibration.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Map<String, Value> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default(),
            Err(_) => Map::new(),
        }
    }

    /// Merges one key into the file, leaving every other key untouched.
    fn write_key(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    /// The persisted bar rectangle from a previous calibration, if any.
    pub fn bar_rect(&self) -> Option<Rect> {
        let map = self.read_map();
        serde_json::from_value(map.get(KEY_BAR_RECT)?.clone()).ok()
    }

    pub fn save_bar_rect(&self, rect: Rect) -> Result<()> {
        log::info!("Bar rect saved: {:?}", rect);
        self.write_key(KEY_BAR_RECT, serde_json::to_value(rect)?)
    }

    /// Prediction horizon in milliseconds (default when absent or invalid).
    pub fn prediction_ms(&self) -> u64 {
        self.read_map()
            .get(KEY_PRED_MS)
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PRED_MS)
    }

    pub fn save_prediction_ms(&self, ms: u64) -> Result<()> {
        self.write_key(KEY_PRED_MS, Value::from(ms))
    }

    /// Tuning block, falling back to the built-in measured defaults.
    pub fn tuning(&self) -> Tuning {
        self.read_map()
            .get(KEY_TUNING)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Calibrated detection and tracking thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tuning {
    /// Green-bar template threshold (calibration search).
    #[serde(default = "default_bar_threshold")]
    pub bar_threshold: f32,
    /// Bobber icon template threshold.
    #[serde(default = "default_bobber_threshold")]
    pub bobber_threshold: f32,
    /// Take-dialog template threshold.
    #[serde(default = "default_take_threshold")]
    pub take_threshold: f32,
    /// Slider/zone overlap margin in pixels when locking the green zone.
    #[serde(default = "default_zone_margin")]
    pub zone_lock_margin: i32,
    /// Consecutive sliderless ticks before the cast phase resets its locks.
    #[serde(default = "default_no_slider_limit")]
    pub no_slider_limit: u32,
    /// Extra circles over the baseline that count as a bubble event.
    #[serde(default = "default_bubble_margin")]
    pub bubble_margin: usize,
    /// Fraction of the zone (along travel) in which predictions are accepted.
    #[serde(default = "default_zone_fraction")]
    pub zone_accept_fraction: f32,
}

fn default_bar_threshold() -> f32 {
    0.8
}

fn default_bobber_threshold() -> f32 {
    0.8
}

fn default_take_threshold() -> f32 {
    0.85
}

fn default_zone_margin() -> i32 {
    20
}

fn default_no_slider_limit() -> u32 {
    50
}

fn default_bubble_margin() -> usize {
    2
}

fn default_zone_fraction() -> f32 {
    0.75
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            bar_threshold: default_bar_threshold(),
            bobber_threshold: default_bobber_threshold(),
            take_threshold: default_take_threshold(),
            zone_lock_margin: default_zone_margin(),
            no_slider_limit: default_no_slider_limit(),
            bubble_margin: default_bubble_margin(),
            zone_accept_fraction: default_zone_fraction(),
        }
    }
}
