use serde_json::{Map, Value};

use super::{Action, ActionError};
use crate::engine::{Runtime, TickContext};
use crate::graph::ParamsExt;
use crate::input::{click_at, parse_modifiers, with_modifiers};
use crate::vision::Resolution;

/// Clicks the center of the last successful template match
#[derive(Debug, Clone, Default)]
pub struct ClickMatch {
    modifiers: Vec<String>,
}

impl ClickMatch {
    pub fn new(modifiers: Vec<String>) -> Self {
        Self { modifiers }
    }

    pub fn from_params(params: &Map<String, Value>) -> Self {
        Self::new(parse_modifiers(params.get("modifiers")))
    }
}

impl Action for ClickMatch {
    fn execute(&self, ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError> {
        let last = runtime.last_match.as_ref().ok_or(ActionError::NoPriorMatch)?;
        let geometry = ctx.geometry().ok_or(ActionError::NoGeometry)?;

        let (cx, cy) = last.center();
        let (x, y) = geometry.to_screen(cx, cy);
        log::info!("Clicking {} at ({}, {})", last.template, x, y);

        let settle = runtime.modifier_settle();
        let hold = runtime.click_hold();
        with_modifiers(runtime.input.as_mut(), &self.modifiers, settle, |input| {
            click_at(input, x, y, hold)
        })?;
        Ok(())
    }
}

/// Clicks a fixed point of the window.
///
/// Points carrying `resolution_width`/`resolution_height` are scaled from
/// that resolution to the live frame. Points without it are used as raw
/// window offsets.
#[derive(Debug, Clone)]
pub struct ClickPosition {
    x: i32,
    y: i32,
    authored: Option<Resolution>,
    modifiers: Vec<String>,
}

impl ClickPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            authored: None,
            modifiers: Vec::new(),
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let (Some(x), Some(y)) = (params.int("x"), params.int("y")) else {
            return Err("'x' and 'y' are required".to_string());
        };
        Ok(Self {
            x: x as i32,
            y: y as i32,
            authored: Resolution::from_params(params),
            modifiers: parse_modifiers(params.get("modifiers")),
        })
    }

    /// Point in frame pixels
    fn frame_point(&self, ctx: &TickContext) -> (i32, i32) {
        match self.authored {
            Some(_) => ctx.frame.map_point(self.x, self.y, self.authored),
            None => (self.x, self.y),
        }
    }
}

impl Action for ClickPosition {
    fn execute(&self, ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError> {
        let geometry = ctx.geometry().ok_or(ActionError::NoGeometry)?;
        let (fx, fy) = self.frame_point(ctx);
        let (x, y) = geometry.to_screen(fx, fy);
        log::info!("Clicking position ({}, {}) at ({}, {})", self.x, self.y, x, y);

        let settle = runtime.modifier_settle();
        let hold = runtime.click_hold();
        with_modifiers(runtime.input.as_mut(), &self.modifiers, settle, |input| {
            click_at(input, x, y, hold)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::engine::LastMatch;
    use crate::input::fakes::InputEvent::*;
    use crate::vision::{CapturedFrame, LazyOcr};
    use image::{Rgba, RgbaImage};
    use serde_json::json;

    // FakeWindow sits at (100, 50)
    fn frame() -> RgbaImage {
        RgbaImage::from_pixel(960, 540, Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn test_click_match_uses_match_center() {
        let frame = frame();
        let (mut runtime, _, input) = runtime_for(&frame, LazyOcr::unavailable());
        runtime.last_match = Some(LastMatch {
            template: "ok.png".into(),
            location: (200, 100),
            size: (40, 20),
        });
        let ctx = context_for(&runtime, &frame);

        ClickMatch::new(vec!["ctrl".into()]).execute(&ctx, &mut runtime).unwrap();

        assert_eq!(
            input.events(),
            vec![KeyDown("ctrl".into()), Move(320, 160), Down, Up, KeyUp("ctrl".into())]
        );
    }

    #[test]
    fn test_click_match_requires_prior_match() {
        let frame = frame();
        let (mut runtime, _, input) = runtime_for(&frame, LazyOcr::unavailable());
        let ctx = context_for(&runtime, &frame);

        let result = ClickMatch::default().execute(&ctx, &mut runtime);
        assert!(matches!(result, Err(ActionError::NoPriorMatch)));
        assert!(input.events().is_empty());
    }

    #[test]
    fn test_click_match_requires_geometry() {
        let frame = frame();
        let (mut runtime, _, _) = runtime_for(&frame, LazyOcr::unavailable());
        runtime.last_match = Some(LastMatch {
            template: "ok.png".into(),
            location: (0, 0),
            size: (4, 4),
        });
        let ctx = TickContext::new(CapturedFrame::new(frame, None, runtime.settings.reference));

        let result = ClickMatch::default().execute(&ctx, &mut runtime);
        assert!(matches!(result, Err(ActionError::NoGeometry)));
    }

    #[test]
    fn test_modifiers_released_when_click_fails() {
        let frame = frame();
        let (mut runtime, _, mut input) = runtime_for(&frame, LazyOcr::unavailable());
        input.fail_clicks = true;
        runtime.input = Box::new(input.clone());
        runtime.last_match = Some(LastMatch {
            template: "ok.png".into(),
            location: (0, 0),
            size: (10, 10),
        });
        let ctx = context_for(&runtime, &frame);

        let result = ClickMatch::new(vec!["shift".into()]).execute(&ctx, &mut runtime);
        assert!(matches!(result, Err(ActionError::Input(_))));
        assert_eq!(
            input.events(),
            vec![KeyDown("shift".into()), Move(105, 55), KeyUp("shift".into())]
        );
    }

    #[test]
    fn test_click_position_raw_offset() {
        let frame = frame();
        let (mut runtime, _, input) = runtime_for(&frame, LazyOcr::unavailable());
        let ctx = context_for(&runtime, &frame);

        let params = json!({ "x": 400, "y": 300 });
        ClickPosition::from_params(params.as_object().unwrap())
            .unwrap()
            .execute(&ctx, &mut runtime)
            .unwrap();

        assert_eq!(input.events(), vec![Move(500, 350), Down, Up]);
    }

    #[test]
    fn test_click_position_scaled_from_authored_resolution() {
        let frame = frame();
        let (mut runtime, _, input) = runtime_for(&frame, LazyOcr::unavailable());
        let ctx = context_for(&runtime, &frame);

        let params = json!({
            "x": 400, "y": 300, "modifiers": "alt",
            "resolution_width": 1920, "resolution_height": 1080
        });
        ClickPosition::from_params(params.as_object().unwrap())
            .unwrap()
            .execute(&ctx, &mut runtime)
            .unwrap();

        assert_eq!(
            input.events(),
            vec![KeyDown("alt".into()), Move(300, 200), Down, Up, KeyUp("alt".into())]
        );
    }

    #[test]
    fn test_click_position_requires_coordinates() {
        let params = json!({ "x": 4 });
        assert!(ClickPosition::from_params(params.as_object().unwrap()).is_err());
    }
}
