//! Transition triggers
//!
//! A trigger is compiled once from its [`TriggerSpec`] when the engine is
//! built. Unknown or malformed triggers compile to [`Never`], which keeps the
//! rest of the graph runnable.

mod color;
mod ocr;
mod template;

use crate::engine::{Runtime, TickContext};
use crate::graph::{trigger_kinds, TriggerSpec};

pub use color::ColorMatch;
pub use ocr::OcrWatch;
pub use template::TemplateMatch;

/// A perception check gating an edge
pub trait Trigger: Send {
    /// Whether the condition holds for this tick
    fn evaluate(&mut self, ctx: &TickContext, runtime: &mut Runtime) -> bool;

    /// Template that has to be loadable before a run can start
    fn required_template(&self) -> Option<&str> {
        None
    }
}

/// Build the executable form of a trigger
pub fn build_trigger(spec: &TriggerSpec) -> Box<dyn Trigger> {
    let built = match spec.kind.as_str() {
        trigger_kinds::TEMPLATE_MATCH => TemplateMatch::from_params(&spec.params).map(boxed),
        trigger_kinds::COLOR_MATCH => ColorMatch::from_params(&spec.params).map(boxed),
        trigger_kinds::OCR_WATCH => OcrWatch::from_params(&spec.params).map(boxed),
        trigger_kinds::IMMEDIATE => Ok(boxed(Immediate)),
        trigger_kinds::WAIT => {
            log::warn!("'wait' trigger is never satisfied; use a 'wait' action for delays");
            Ok(boxed(Never))
        }
        other => {
            log::warn!("Unknown trigger type '{}', edge will never fire", other);
            Ok(boxed(Never))
        }
    };

    built.unwrap_or_else(|reason| {
        log::error!("Invalid {} trigger: {}; edge will never fire", spec.kind, reason);
        boxed(Never)
    })
}

fn boxed<T: Trigger + 'static>(trigger: T) -> Box<dyn Trigger> {
    Box::new(trigger)
}

/// Always satisfied
#[derive(Debug, Default)]
pub struct Immediate;

impl Trigger for Immediate {
    fn evaluate(&mut self, _ctx: &TickContext, _runtime: &mut Runtime) -> bool {
        true
    }
}

/// Never satisfied; stands in for `wait`, unknown and malformed triggers
#[derive(Debug, Default)]
pub struct Never;

impl Trigger for Never {
    fn evaluate(&mut self, _ctx: &TickContext, _runtime: &mut Runtime) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::vision::LazyOcr;
    use image::{Rgba, RgbaImage};
    use serde_json::json;

    #[test]
    fn test_factory_degrades_unknown_and_wait() {
        let frame = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let (mut runtime, _, _) = runtime_for(&frame, LazyOcr::unavailable());
        let ctx = context_for(&runtime, &frame);

        for spec in [
            TriggerSpec::new("teleport", json!({})),
            TriggerSpec::new(trigger_kinds::WAIT, json!({ "duration": 1.0 })),
            TriggerSpec::new(trigger_kinds::TEMPLATE_MATCH, json!({})),
            TriggerSpec::new(trigger_kinds::OCR_WATCH, json!({ "region": [1, 2] })),
        ] {
            let mut trigger = build_trigger(&spec);
            assert!(!trigger.evaluate(&ctx, &mut runtime), "{} should never fire", spec.kind);
        }

        assert!(build_trigger(&TriggerSpec::immediate()).evaluate(&ctx, &mut runtime));
    }
}
