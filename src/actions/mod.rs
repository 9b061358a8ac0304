//! Transition actions
//!
//! Actions run when an edge fires. Like triggers they are compiled once from
//! their [`ActionSpec`]; unknown types and malformed parameters compile to a
//! logged no-op so one bad edge never takes the loop down.

mod camera;
mod click;
mod keys;

use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::engine::{Runtime, TickContext};
use crate::graph::{action_kinds, ActionSpec, ParamsExt};
use crate::input::InputError;
use crate::vision::VisionError;

pub use camera::CenterCamera;
pub use click::{ClickMatch, ClickPosition};
pub use keys::PressKey;

/// Default `wait` action length in seconds
pub const DEFAULT_WAIT_SECS: f64 = 0.5;
/// Default buzzer tone
pub const DEFAULT_BUZZER_HZ: u32 = 600;
pub const DEFAULT_BUZZER_SECS: f64 = 0.5;

/// An effect on the target application
pub trait Action: Send {
    fn execute(&self, ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError>;
}

/// A compiled action together with the delays the engine runs around it
pub struct CompiledAction {
    kind: String,
    wait_before: Duration,
    wait_after: Duration,
    action: Box<dyn Action>,
}

impl CompiledAction {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Sleep `wait_before`, execute, then sleep `wait_after`.
    ///
    /// The post-delay is honored even when the action fails.
    pub fn run(&self, ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError> {
        if !self.wait_before.is_zero() {
            thread::sleep(self.wait_before);
        }
        let result = self.action.execute(ctx, runtime);
        if !self.wait_after.is_zero() {
            thread::sleep(self.wait_after);
        }
        result
    }
}

impl std::fmt::Debug for CompiledAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledAction")
            .field("kind", &self.kind)
            .field("wait_before", &self.wait_before)
            .field("wait_after", &self.wait_after)
            .finish()
    }
}

/// Build the executable form of an action
pub fn build_action(spec: &ActionSpec) -> CompiledAction {
    compile(spec).unwrap_or_else(|reason| {
        log::error!("Invalid {} action: {}; it will do nothing", spec.kind, reason);
        CompiledAction {
            kind: spec.kind.clone(),
            wait_before: Duration::ZERO,
            wait_after: Duration::ZERO,
            action: boxed(Noop),
        }
    })
}

fn compile(spec: &ActionSpec) -> Result<CompiledAction, String> {
    let params = &spec.params;
    let action = match spec.kind.as_str() {
        action_kinds::CLICK_MATCH => boxed(ClickMatch::from_params(params)),
        action_kinds::PRESS_KEY => boxed(PressKey::from_params(params)?),
        action_kinds::CLICK_POSITION => boxed(ClickPosition::from_params(params)?),
        action_kinds::WAIT => boxed(Wait::from_params(params)?),
        action_kinds::CENTER_CAMERA => boxed(CenterCamera),
        action_kinds::BUZZER => boxed(Buzzer::from_params(params)?),
        other => {
            log::warn!("Unknown action type '{}', it will do nothing", other);
            boxed(Noop)
        }
    };

    Ok(CompiledAction {
        kind: spec.kind.clone(),
        wait_before: params.seconds_or("wait_before", 0.0)?,
        wait_after: params.seconds_or("wait_after", 0.0)?,
        action,
    })
}

fn boxed<T: Action + 'static>(action: T) -> Box<dyn Action> {
    Box::new(action)
}

/// Does nothing; stands in for unknown and malformed actions
#[derive(Debug, Default)]
pub struct Noop;

impl Action for Noop {
    fn execute(&self, _ctx: &TickContext, _runtime: &mut Runtime) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Sleep on the tick thread
#[derive(Debug, Clone)]
pub struct Wait {
    duration: Duration,
}

impl Wait {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        Ok(Self::new(params.seconds_or("duration", DEFAULT_WAIT_SECS)?))
    }
}

impl Action for Wait {
    fn execute(&self, _ctx: &TickContext, _runtime: &mut Runtime) -> Result<(), ActionError> {
        log::debug!("Waiting {:?}", self.duration);
        thread::sleep(self.duration);
        Ok(())
    }
}

/// Audible notification for whoever is watching
#[derive(Debug, Clone)]
pub struct Buzzer {
    frequency: u32,
    duration: Duration,
}

impl Buzzer {
    pub fn new(frequency: u32, duration: Duration) -> Self {
        Self { frequency, duration }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let frequency = params
            .int("frequency")
            .filter(|f| *f > 0)
            .map_or(DEFAULT_BUZZER_HZ, |f| f.min(u32::MAX as i64) as u32);
        Ok(Self::new(frequency, params.seconds_or("duration", DEFAULT_BUZZER_SECS)?))
    }
}

impl Action for Buzzer {
    fn execute(&self, _ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError> {
        runtime.beeper.beep(self.frequency, self.duration)?;
        Ok(())
    }
}

/// Action errors
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("No template has matched yet")]
    NoPriorMatch,
    #[error("Window geometry is unknown")]
    NoGeometry,
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Vision(#[from] VisionError),
}
