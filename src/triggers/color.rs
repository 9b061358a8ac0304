use image::Rgba;
use serde_json::{Map, Value};

use super::Trigger;
use crate::engine::{Runtime, TickContext};
use crate::graph::ParamsExt;
use crate::vision::Resolution;

/// Satisfied when one pixel is close enough to a target color
#[derive(Debug, Clone)]
pub struct ColorMatch {
    x: i32,
    y: i32,
    rgb: [u8; 3],
    tolerance: f64,
    authored: Option<Resolution>,
}

impl ColorMatch {
    pub fn new(x: i32, y: i32, rgb: [u8; 3], tolerance: f64) -> Self {
        Self {
            x,
            y,
            rgb,
            tolerance,
            authored: None,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let rgb = params.int_list::<3>("rgb").unwrap_or([0, 0, 0]);
        let channel = |v: i64| v.clamp(0, 255) as u8;
        Ok(Self {
            x: params.int("x").unwrap_or(0) as i32,
            y: params.int("y").unwrap_or(0) as i32,
            rgb: [channel(rgb[0]), channel(rgb[1]), channel(rgb[2])],
            tolerance: params.number_or("tolerance", 10.0),
            authored: Resolution::from_params(params),
        })
    }
}

/// Euclidean distance in RGB space
pub fn color_distance(pixel: Rgba<u8>, target: [u8; 3]) -> f64 {
    pixel.0[..3]
        .iter()
        .zip(target)
        .map(|(&a, b)| {
            let d = a as f64 - b as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

impl Trigger for ColorMatch {
    fn evaluate(&mut self, ctx: &TickContext, _runtime: &mut Runtime) -> bool {
        let (x, y) = ctx.frame.map_point(self.x, self.y, self.authored);
        match ctx.frame.pixel(x, y) {
            Some(pixel) => {
                let distance = color_distance(pixel, self.rgb);
                log::trace!("Color at ({}, {}) is {:.1} away", x, y, distance);
                distance <= self.tolerance
            }
            None => {
                log::debug!("Color point ({}, {}) is outside the frame", x, y);
                false
            }
        }
    }
}
