use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};

use super::{Action, ActionError};
use crate::engine::{Runtime, TickContext};
use crate::graph::ParamsExt;
use crate::input::{parse_modifiers, scripted_click, tap_key, with_modifiers, LEFT_CLICK};

/// Shortest accepted key hold
const MIN_HOLD: Duration = Duration::from_millis(10);
/// `left_click` holds longer than this press the button instead of clicking
const CLICK_HOLD_THRESHOLD: Duration = Duration::from_millis(100);

/// Taps or holds a key, or the left mouse button via `left_click`
#[derive(Debug, Clone)]
pub struct PressKey {
    key: String,
    duration: Duration,
    modifiers: Vec<String>,
}

impl PressKey {
    pub fn new(key: impl Into<String>, duration: Duration) -> Self {
        Self {
            key: key.into(),
            duration: duration.max(MIN_HOLD),
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Vec<String>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let key = params
            .text("key")
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or("missing 'key'")?;
        let duration = params.seconds_or("duration", 0.05)?;
        Ok(Self::new(key, duration)
            .with_modifiers(parse_modifiers(params.get("modifiers"))))
    }

    fn is_mouse(&self) -> bool {
        self.key.eq_ignore_ascii_case(LEFT_CLICK)
    }
}

impl Action for PressKey {
    fn execute(&self, _ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError> {
        log::info!("Pressing {} for {:?}", self.key, self.duration);

        let settle = runtime.modifier_settle();
        let hold = runtime.click_hold();
        let release_settle = runtime.key_release_settle();
        with_modifiers(runtime.input.as_mut(), &self.modifiers, settle, |input| {
            if !self.is_mouse() {
                tap_key(input, &self.key, self.duration)?;
            } else if self.duration > CLICK_HOLD_THRESHOLD {
                input.mouse_down()?;
                thread::sleep(self.duration);
                input.mouse_up()?;
            } else {
                scripted_click(input, hold)?;
                thread::sleep(self.duration);
            }
            thread::sleep(release_settle);
            Ok(())
        })?;
        Ok(())
    }
}
