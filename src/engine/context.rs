//! Per-tick context and per-run runtime state
//!
//! A [`TickContext`] is built fresh from each captured frame and is read-only
//! for triggers and actions. The [`Runtime`] holds everything that lives for
//! the whole run: collaborators, caches and the last successful match.

use std::time::Duration;

use crate::config::EngineSettings;
use crate::input::{Beeper, InputInjector};
use crate::vision::{CapturedFrame, FrameSource, LazyOcr, Matcher, Rect, TemplateCache};

/// Read-only inputs of one tick
#[derive(Debug)]
pub struct TickContext {
    pub frame: CapturedFrame,
}

impl TickContext {
    pub fn new(frame: CapturedFrame) -> Self {
        Self { frame }
    }

    pub fn geometry(&self) -> Option<Rect> {
        self.frame.geometry()
    }
}

/// Location of the most recent positive template match.
///
/// Written only by template triggers, read only by `click_match` and
/// `center_camera`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMatch {
    pub template: String,
    /// Top-left corner in frame pixels
    pub location: (u32, u32),
    /// Matched region size in frame pixels
    pub size: (u32, u32),
}

impl LastMatch {
    /// Center of the match in frame pixels
    pub fn center(&self) -> (i32, i32) {
        (
            (self.location.0 + self.size.0 / 2) as i32,
            (self.location.1 + self.size.1 / 2) as i32,
        )
    }
}

/// State worth keeping between runs: decoded templates and the OCR handle.
///
/// Take it from a stopped engine with `Engine::into_resources` and give it to
/// the next one with `Engine::with_resources`.
#[derive(Debug, Default)]
pub struct SharedResources {
    pub templates: TemplateCache,
    pub ocr: LazyOcr,
}

impl SharedResources {
    pub fn new(templates: TemplateCache, ocr: LazyOcr) -> Self {
        Self { templates, ocr }
    }
}

/// Everything a trigger or action may touch besides the frame
pub struct Runtime {
    pub settings: EngineSettings,
    pub matcher: Matcher,
    pub frames: FrameSource,
    pub input: Box<dyn InputInjector>,
    pub beeper: Box<dyn Beeper>,
    pub resources: SharedResources,
    pub last_match: Option<LastMatch>,
}

impl Runtime {
    pub fn new(
        settings: EngineSettings,
        frames: FrameSource,
        input: Box<dyn InputInjector>,
        beeper: Box<dyn Beeper>,
        mut resources: SharedResources,
    ) -> Self {
        resources.templates.set_dir(settings.assets_dir.clone());
        Self {
            matcher: Matcher::new(&settings.matcher),
            settings,
            frames,
            input,
            beeper,
            resources,
            last_match: None,
        }
    }

    pub(crate) fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    pub fn modifier_settle(&self) -> Duration {
        Self::millis(self.settings.timings.modifier_settle_ms)
    }

    pub fn click_hold(&self) -> Duration {
        Self::millis(self.settings.timings.click_hold_ms)
    }

    pub fn key_release_settle(&self) -> Duration {
        Self::millis(self.settings.timings.key_release_settle_ms)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use image::RgbaImage;

    use super::*;
    use crate::input::fakes::RecordingInjector;
    use crate::vision::capture::fakes::FakeWindow;

    /// Runtime around a fake window showing `frame`
    pub fn runtime_with(
        settings: EngineSettings,
        frame: &RgbaImage,
        ocr: LazyOcr,
    ) -> (Runtime, FakeWindow, RecordingInjector) {
        let window = FakeWindow::new(frame.clone());
        let input = RecordingInjector::default();
        let runtime = Runtime::new(
            settings.clone(),
            FrameSource::new(Box::new(window.clone()), &settings),
            Box::new(input.clone()),
            Box::new(input.clone()),
            SharedResources::new(TemplateCache::new(settings.assets_dir.clone()), ocr),
        );
        (runtime, window, input)
    }

    /// Same with default settings and no delays
    pub fn runtime_for(frame: &RgbaImage, ocr: LazyOcr) -> (Runtime, FakeWindow, RecordingInjector) {
        runtime_with(EngineSettings::default().without_delays(), frame, ocr)
    }

    pub fn context_for(runtime: &Runtime, frame: &RgbaImage) -> TickContext {
        TickContext::new(CapturedFrame::new(
            frame.clone(),
            runtime.frames.geometry(),
            runtime.settings.reference,
        ))
    }
}
