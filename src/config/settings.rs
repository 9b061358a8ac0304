//! Engine settings
//!
//! Defines every tunable timing, threshold and loop bound used by the engine.
//! All values have defaults, so a settings file only needs the fields it
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::vision::capture::{CaptureMode, Resolution};

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Resolution that templates, regions and click points are authored in
    pub reference: Resolution,
    /// How frames are grabbed from the target window
    pub capture_mode: CaptureMode,
    /// Directory template images are loaded from
    pub assets_dir: PathBuf,
    /// Loop and input timings
    pub timings: TimingSettings,
    /// Multi-scale matcher band
    pub matcher: MatcherSettings,
    /// Stall detection and recovery scan
    pub recovery: RecoverySettings,
    /// Visual servo used by `center_camera`
    pub camera: CameraSettings,
    /// OCR preprocessing and polling
    pub ocr: OcrSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reference: Resolution::REFERENCE,
            capture_mode: CaptureMode::Interactive,
            assets_dir: PathBuf::from("assets"),
            timings: TimingSettings::default(),
            matcher: MatcherSettings::default(),
            recovery: RecoverySettings::default(),
            camera: CameraSettings::default(),
            ocr: OcrSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Settings that never bring the target window to the foreground
    pub fn background() -> Self {
        Self {
            capture_mode: CaptureMode::Background,
            ..Default::default()
        }
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Set the template directory
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Set the capture mode
    pub fn with_capture_mode(mut self, mode: CaptureMode) -> Self {
        self.capture_mode = mode;
        self
    }

    /// Set the stall timeout
    pub fn with_dwell_timeout(mut self, timeout: Duration) -> Self {
        self.recovery.dwell_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Zero every sleep in the tick loop (used by hosts that drive `tick` themselves)
    pub fn without_delays(mut self) -> Self {
        self.timings = TimingSettings::immediate();
        self.camera.step_delay_ms = 0;
        self
    }

    /// Overlay cross-cutting flags stored in a graph's settings bag.
    ///
    /// Recognized keys: `background_mode`, `dwell_timeout` (seconds),
    /// `recovery_threshold` and `enforce_ocr_interval`. Anything else is ignored.
    pub fn apply_graph_settings(&mut self, bag: &Map<String, Value>) {
        if let Some(true) = bag.get("background_mode").and_then(Value::as_bool) {
            self.capture_mode = CaptureMode::Background;
        }
        if let Some(secs) = bag.get("dwell_timeout").and_then(Value::as_f64) {
            if secs >= 0.0 {
                self.recovery.dwell_timeout_ms = (secs * 1000.0) as u64;
            }
        }
        if let Some(threshold) = bag.get("recovery_threshold").and_then(Value::as_f64) {
            self.recovery.confidence = threshold as f32;
        }
        if let Some(enforce) = bag.get("enforce_ocr_interval").and_then(Value::as_bool) {
            self.ocr.enforce_interval = enforce;
        }
    }
}

/// Timing settings for the loop and for synthetic input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Idle between ticks (ms)
    pub tick_idle_ms: u64,
    /// Poll interval while paused (ms)
    pub pause_poll_ms: u64,
    /// Wait after a failed capture (ms)
    pub capture_retry_ms: u64,
    /// Settle time after a committed transition (ms)
    pub transition_debounce_ms: u64,
    /// Wait after restoring a minimized window (ms)
    pub restore_delay_ms: u64,
    /// Delay between pressing modifiers and the main input (ms)
    pub modifier_settle_ms: u64,
    /// Mouse button hold time of a scripted click (ms)
    pub click_hold_ms: u64,
    /// Delay after a key tap before modifiers are released (ms)
    pub key_release_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tick_idle_ms: 30,
            pause_poll_ms: 100,
            capture_retry_ms: 100,
            transition_debounce_ms: 200,
            restore_delay_ms: 200,
            modifier_settle_ms: 50,
            click_hold_ms: 80,
            key_release_settle_ms: 50,
        }
    }
}

impl TimingSettings {
    /// All delays set to zero
    pub fn immediate() -> Self {
        Self {
            tick_idle_ms: 0,
            pause_poll_ms: 0,
            capture_retry_ms: 0,
            transition_debounce_ms: 0,
            restore_delay_ms: 0,
            modifier_settle_ms: 0,
            click_hold_ms: 0,
            key_release_settle_ms: 0,
        }
    }
}

/// Scale band searched around the capture scale hint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    /// Lowest factor relative to the hint
    pub scale_min: f32,
    /// Highest factor relative to the hint
    pub scale_max: f32,
    /// Number of evenly spaced samples, both ends included
    pub scale_steps: u32,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            scale_min: 0.8,
            scale_max: 1.2,
            scale_steps: 20,
        }
    }
}

/// Stall detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Whether the recovery scan runs at all
    pub enabled: bool,
    /// Time without a transition before scanning (ms)
    pub dwell_timeout_ms: u64,
    /// Minimum confidence for a recovery hit
    pub confidence: f32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dwell_timeout_ms: 5000,
            confidence: 0.85,
        }
    }
}

impl RecoverySettings {
    pub fn dwell_timeout(&self) -> Duration {
        Duration::from_millis(self.dwell_timeout_ms)
    }
}

/// Visual servo settings for `center_camera`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Distance from frame center counted as centered (px)
    pub tolerance_px: i32,
    /// Iteration budget
    pub max_iterations: u32,
    /// Fraction of the offset applied per step
    pub gain: f32,
    /// Confidence below which tracking is considered lost
    pub min_confidence: f32,
    /// Pause after each nudge (ms)
    pub step_delay_ms: u64,
    /// Wall-clock budget for the whole loop (ms)
    pub time_budget_ms: u64,
    /// Moves smaller than this are dropped (px)
    pub dead_zone_px: i32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            tolerance_px: 30,
            max_iterations: 20,
            gain: 0.5,
            min_confidence: 0.7,
            step_delay_ms: 50,
            time_budget_ms: 3000,
            dead_zone_px: 2,
        }
    }
}

/// OCR preprocessing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Upscale factor applied before binarization
    pub upscale: u32,
    /// Honor each trigger's `interval` parameter as a rate limit
    pub enforce_interval: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            upscale: 3,
            enforce_interval: false,
        }
    }
}

/// Settings loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}
