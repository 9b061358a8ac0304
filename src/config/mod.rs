//! Configuration module
//!
//! Handles engine timings, thresholds and capture preferences.

pub mod settings;

pub use settings::{
    CameraSettings, ConfigError, EngineSettings, MatcherSettings, OcrSettings, RecoverySettings,
    TimingSettings,
};
