use std::thread;
use std::time::{Duration, Instant};

use super::{Action, ActionError};
use crate::engine::{Runtime, TickContext};

/// Nudges the view until the last matched template sits at the frame center.
///
/// Each step re-captures, re-locates the template and moves the pointer by a
/// fraction of the remaining offset. The loop is bounded by the iteration
/// count and the wall-clock budget from [`crate::config::CameraSettings`].
#[derive(Debug, Clone, Default)]
pub struct CenterCamera;

impl Action for CenterCamera {
    fn execute(&self, _ctx: &TickContext, runtime: &mut Runtime) -> Result<(), ActionError> {
        let last = runtime.last_match.clone().ok_or(ActionError::NoPriorMatch)?;
        let template = runtime.resources.templates.get(&last.template)?.clone();
        let camera = runtime.settings.camera.clone();
        let budget = Duration::from_millis(camera.time_budget_ms);
        let started = Instant::now();

        for step in 0..camera.max_iterations {
            if started.elapsed() > budget {
                log::warn!("Camera centering ran out of time after {} steps", step);
                break;
            }

            let Some(frame) = runtime.frames.capture() else {
                log::debug!("Camera centering: capture failed");
                break;
            };
            let hit = runtime
                .matcher
                .locate(frame.gray(), &template, frame.scale_hint())
                .filter(|hit| hit.confidence >= camera.min_confidence);
            let Some(hit) = hit else {
                log::info!("Camera centering lost track of {}", last.template);
                break;
            };

            let (width, height) = frame.dimensions();
            let (cx, cy) = hit.center();
            let dx = cx as i32 - (width / 2) as i32;
            let dy = cy as i32 - (height / 2) as i32;
            if dx.abs() < camera.tolerance_px && dy.abs() < camera.tolerance_px {
                log::info!("Camera centered on {} after {} steps", last.template, step);
                break;
            }

            let nudge = |offset: i32| {
                let moved = (offset as f32 * camera.gain) as i32;
                if moved.abs() < camera.dead_zone_px {
                    0
                } else {
                    moved
                }
            };
            let (mx, my) = (nudge(dx), nudge(dy));
            if mx == 0 && my == 0 {
                break;
            }

            log::debug!("Camera offset ({}, {}), moving ({}, {})", dx, dy, mx, my);
            runtime.input.move_relative(mx, my)?;
            thread::sleep(Duration::from_millis(camera.step_delay_ms));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::engine::testing::*;
    use crate::engine::LastMatch;
    use crate::input::fakes::InputEvent::*;
    use crate::vision::matcher::test_images::*;
    use crate::vision::{LazyOcr, Resolution};
    use image::{Rgba, RgbaImage};

    fn settings() -> EngineSettings {
        let mut settings = EngineSettings::default().without_delays();
        settings.reference = Resolution::new(192, 108);
        settings.camera.max_iterations = 3;
        settings
    }

    fn run(frame: &RgbaImage, target: &RgbaImage) -> Vec<crate::input::fakes::InputEvent> {
        let (mut runtime, _, input) = runtime_with(settings(), frame, LazyOcr::unavailable());
        runtime.resources.templates.insert("target.png", gray(target));
        runtime.last_match = Some(LastMatch {
            template: "target.png".into(),
            location: (0, 0),
            size: target.dimensions(),
        });
        let ctx = context_for(&runtime, frame);
        CenterCamera.execute(&ctx, &mut runtime).unwrap();
        input.events()
    }

    #[test]
    fn test_moves_toward_target_until_budget() {
        let target = textured(20, 14, 5);
        let frame = with_patch(&textured(192, 108, 1), &target, 20, 20);

        // Match center (30, 27) against frame center (96, 54)
        assert_eq!(run(&frame, &target), vec![MoveBy(-33, -13); 3]);
    }

    #[test]
    fn test_already_centered_does_not_move() {
        let target = textured(20, 14, 5);
        let frame = with_patch(&textured(192, 108, 1), &target, 86, 47);
        assert!(run(&frame, &target).is_empty());
    }

    #[test]
    fn test_offset_equal_to_tolerance_still_moves() {
        let target = textured(20, 14, 5);
        // Match center (86, 54) is exactly 10px left of the frame center
        let frame = with_patch(&textured(192, 108, 1), &target, 76, 47);
        let (mut runtime, _, input) = runtime_with(settings(), &frame, LazyOcr::unavailable());
        runtime.settings.camera.tolerance_px = 10;
        runtime.resources.templates.insert("target.png", gray(&target));
        runtime.last_match = Some(LastMatch {
            template: "target.png".into(),
            location: (76, 47),
            size: (20, 14),
        });
        let ctx = context_for(&runtime, &frame);
        CenterCamera.execute(&ctx, &mut runtime).unwrap();

        assert_eq!(input.events(), vec![MoveBy(-5, 0); 3]);
    }

    #[test]
    fn test_lost_tracking_stops() {
        let target = textured(20, 14, 5);
        let frame = RgbaImage::from_pixel(192, 108, Rgba([90, 90, 90, 255]));
        assert!(run(&frame, &target).is_empty());
    }

    #[test]
    fn test_requires_prior_match() {
        let frame = textured(64, 36, 1);
        let (mut runtime, _, _) = runtime_for(&frame, LazyOcr::unavailable());
        let ctx = context_for(&runtime, &frame);
        assert!(matches!(
            CenterCamera.execute(&ctx, &mut runtime),
            Err(ActionError::NoPriorMatch)
        ));
    }
}
