use std::time::{Duration, Instant};

use image::GrayImage;
use serde_json::{Map, Value};

use super::Trigger;
use crate::engine::{Runtime, TickContext};
use crate::graph::ParamsExt;
use crate::vision::capture::map_point;
use crate::vision::ocr::{read_number, Comparison, OcrError};
use crate::vision::{Rect, Resolution};

/// Compares the first number read from a screen region with a target value
#[derive(Debug, Clone)]
pub struct OcrWatch {
    /// `[x, y, width, height]` in authoring space
    region: [i32; 4],
    comparison: Comparison,
    target: f64,
    interval: Duration,
    authored: Option<Resolution>,
    last_poll: Option<Instant>,
    reported_unavailable: bool,
}

impl OcrWatch {
    pub fn new(region: [i32; 4], comparison: Comparison, target: f64) -> Self {
        Self {
            region,
            comparison,
            target,
            interval: Duration::from_secs(1),
            authored: None,
            last_poll: None,
            reported_unavailable: false,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let [x, y, w, h] = params
            .int_list::<4>("region")
            .ok_or("'region' must be [x, y, width, height]")?;
        if w <= 0 || h <= 0 {
            return Err(format!("empty region {}x{}", w, h));
        }
        let comparison = params
            .text("condition")
            .unwrap_or(">")
            .parse::<Comparison>()
            .map_err(|e| e.to_string())?;

        let region = [x as i32, y as i32, w as i32, h as i32];
        let mut trigger = Self::new(region, comparison, params.number_or("value", 0.0));
        trigger.interval = params.seconds_or("interval", 1.0)?;
        trigger.authored = Resolution::from_params(params);
        Ok(trigger)
    }

    /// Region crop from the frame, or a fresh grab when the frame has none
    fn crop(&self, ctx: &TickContext, runtime: &mut Runtime) -> Option<GrayImage> {
        let (sx, sy) = ctx.frame.scale_for(self.authored);
        let [rx, ry, rw, rh] = self.region;
        let (x, y) = map_point(rx, ry, sx, sy);
        let (w, h) = map_point(rw, rh, sx, sy);
        if w <= 0 || h <= 0 {
            return None;
        }

        if let Some(crop) = ctx.frame.crop_gray(x, y, w as u32, h as u32) {
            return Some(crop);
        }

        let geometry = ctx.geometry()?;
        let (left, top) = geometry.to_screen(x, y);
        let grabbed = runtime.frames.grab_region(Rect::new(left, top, w as u32, h as u32))?;
        Some(image::imageops::grayscale(&grabbed))
    }
}

impl Trigger for OcrWatch {
    fn evaluate(&mut self, ctx: &TickContext, runtime: &mut Runtime) -> bool {
        if runtime.settings.ocr.enforce_interval {
            if let Some(last) = self.last_poll {
                if last.elapsed() < self.interval {
                    return false;
                }
            }
        }
        self.last_poll = Some(Instant::now());

        let Some(crop) = self.crop(ctx, runtime) else {
            log::debug!("OCR region {:?} is not available", self.region);
            return false;
        };

        let upscale = runtime.settings.ocr.upscale;
        match read_number(&mut runtime.resources.ocr, &crop, upscale) {
            Ok(Some(value)) => {
                let holds = self.comparison.holds(value, self.target);
                log::debug!(
                    "OCR value {} {:?} {} -> {}",
                    value,
                    self.comparison,
                    self.target,
                    holds
                );
                holds
            }
            Ok(None) => false,
            Err(OcrError::Unavailable(reason)) => {
                if !self.reported_unavailable {
                    log::warn!("OCR trigger cannot run: {}", reason);
                    self.reported_unavailable = true;
                }
                false
            }
            Err(e) => {
                log::warn!("OCR read failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::vision::ocr::fakes::FixedReader;
    use crate::vision::{DigitReader, LazyOcr};
    use image::{Rgba, RgbaImage};
    use serde_json::json;

    fn frame() -> RgbaImage {
        RgbaImage::from_fn(960, 540, |x, _| {
            if x % 7 < 3 {
                Rgba([250, 250, 250, 255])
            } else {
                Rgba([10, 10, 10, 255])
            }
        })
    }

    fn reader(text: &str) -> (LazyOcr, std::sync::Arc<std::sync::Mutex<u32>>) {
        let fixed = FixedReader::new(&[text]);
        let calls = fixed.calls.clone();
        (LazyOcr::with_reader(Box::new(fixed) as Box<dyn DigitReader>), calls)
    }

    #[test]
    fn test_compares_first_number() {
        let frame = frame();
        let (ocr, _) = reader("1250 gold");
        let (mut runtime, _, _) = runtime_for(&frame, ocr);
        let ctx = context_for(&runtime, &frame);

        let mut below = OcrWatch::new([100, 100, 200, 40], Comparison::Less, 2000.0);
        assert!(below.evaluate(&ctx, &mut runtime));

        let mut above = OcrWatch::new([100, 100, 200, 40], Comparison::Greater, 2000.0);
        assert!(!above.evaluate(&ctx, &mut runtime));
    }

    #[test]
    fn test_unparsable_text_is_unsatisfied() {
        let frame = frame();
        let (ocr, _) = reader("---");
        let (mut runtime, _, _) = runtime_for(&frame, ocr);
        let ctx = context_for(&runtime, &frame);

        let mut trigger = OcrWatch::new([0, 0, 100, 20], Comparison::NotEqual, 1.0);
        assert!(!trigger.evaluate(&ctx, &mut runtime));
    }

    #[test]
    fn test_interval_only_enforced_when_enabled() {
        let frame = frame();
        let (ocr, calls) = reader("5");
        let (mut runtime, _, _) = runtime_for(&frame, ocr);
        let ctx = context_for(&runtime, &frame);

        let params = json!({ "region": [0, 0, 100, 20], "condition": "=", "value": 5, "interval": 60 });
        let mut trigger = OcrWatch::from_params(params.as_object().unwrap()).unwrap();

        assert!(trigger.evaluate(&ctx, &mut runtime));
        assert!(trigger.evaluate(&ctx, &mut runtime));
        assert_eq!(*calls.lock().unwrap(), 2);

        runtime.settings.ocr.enforce_interval = true;
        assert!(!trigger.evaluate(&ctx, &mut runtime));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_region_outside_frame_uses_fresh_grab() {
        let frame = frame();
        let (ocr, calls) = reader("9");
        let (mut runtime, _, _) = runtime_for(&frame, ocr);
        // Captured frame only covers the left quarter of the window
        let partial = image::imageops::crop_imm(&frame, 0, 0, 240, 540).to_image();
        let ctx = context_for(&runtime, &partial);

        // Maps to x=240 in the 240px wide frame, just past its right edge
        let mut trigger = OcrWatch::new([1920, 200, 400, 80], Comparison::Equal, 9.0);
        assert!(trigger.evaluate(&ctx, &mut runtime));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_invalid_params() {
        for params in [
            json!({ "region": [0, 0, 0, 10] }),
            json!({ "region": [0, 0, 10, 10], "condition": "~" }),
            json!({ "region": [0, 0, 10, 10], "interval": 1e30 }),
            json!({}),
        ] {
            assert!(OcrWatch::from_params(params.as_object().unwrap()).is_err());
        }
    }
}
