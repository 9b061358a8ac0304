use serde_json::{Map, Value};

use super::Trigger;
use crate::engine::{LastMatch, Runtime, TickContext};
use crate::graph::ParamsExt;
use crate::vision::matcher::confidence_of;

/// Default confidence a match has to reach
pub const DEFAULT_THRESHOLD: f32 = 0.8;

/// Satisfied when the template is (or, inverted, is not) on screen
#[derive(Debug, Clone)]
pub struct TemplateMatch {
    template: String,
    threshold: f32,
    invert: bool,
}

impl TemplateMatch {
    pub fn new(template: impl Into<String>, threshold: f32, invert: bool) -> Self {
        Self {
            template: template.into(),
            threshold,
            invert,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let template = params
            .text("template")
            .filter(|t| !t.is_empty())
            .ok_or("missing 'template'")?;
        Ok(Self::new(
            template,
            params.number_or("threshold", DEFAULT_THRESHOLD as f64) as f32,
            params.flag_or("invert", false),
        ))
    }
}

impl Trigger for TemplateMatch {
    fn evaluate(&mut self, ctx: &TickContext, runtime: &mut Runtime) -> bool {
        let template = match runtime.resources.templates.get(&self.template) {
            Ok(template) => template,
            Err(e) => {
                log::debug!("Skipping template check: {}", e);
                return false;
            }
        };

        let result = runtime
            .matcher
            .locate(ctx.frame.gray(), template, ctx.frame.scale_hint());
        let confidence = confidence_of(result.as_ref());
        log::trace!("{} confidence {:.3}", self.template, confidence);

        let found = confidence >= self.threshold;
        if let (true, Some(hit)) = (found, result) {
            runtime.last_match = Some(LastMatch {
                template: self.template.clone(),
                location: hit.location,
                size: hit.size,
            });
        }

        found != self.invert
    }

    fn required_template(&self) -> Option<&str> {
        Some(&self.template)
    }
}
