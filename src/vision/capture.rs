//! Frame acquisition
//!
//! Grabs the client area of the target window either from the visible screen
//! or directly from the window, and reports how far the live size deviates
//! from the reference resolution so that reference-space coordinates can be
//! mapped onto the live frame.

use std::thread;
use std::time::Duration;

use image::{GrayImage, ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::VisionError;
use crate::config::EngineSettings;

/// A width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Resolution templates and coordinates are authored in
    pub const REFERENCE: Self = Self {
        width: 1920,
        height: 1080,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Authoring resolution from optional `resolution_width`/`resolution_height`
    /// parameters; both must be positive to count.
    pub fn from_params(params: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        let width = params.get("resolution_width").and_then(|v| v.as_u64())?;
        let height = params.get("resolution_height").and_then(|v| v.as_u64())?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self::new(width as u32, height as u32))
    }
}

/// How frames are taken from the target window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Grab the visible screen area, restoring the window first if minimized
    Interactive,
    /// Read the window's own pixels without touching its visibility
    Background,
}

/// Rectangle in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Translate a point relative to this rectangle into screen coordinates
    pub fn to_screen(&self, x: i32, y: i32) -> (i32, i32) {
        (self.left + x, self.top + y)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The window being automated.
///
/// Window discovery and OS capture live behind this seam; the engine only
/// needs the client geometry and a way to get pixels out.
pub trait WindowTarget: Send {
    /// Client area in screen coordinates, `None` if the window is gone
    fn geometry(&self) -> Option<Rect>;

    fn is_minimized(&self) -> bool;

    /// Bring a minimized window back on screen
    fn restore(&mut self) -> Result<(), VisionError>;

    /// Grab an area of the visible screen
    fn grab_screen(&mut self, area: Rect) -> Result<RgbaImage, VisionError>;

    /// Grab the client area without requiring the window to be visible
    fn grab_window(&mut self) -> Result<RgbaImage, VisionError>;
}

/// One captured frame plus its mapping back to reference space
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    image: RgbaImage,
    gray: GrayImage,
    scale_x: f64,
    scale_y: f64,
    geometry: Option<Rect>,
}

impl CapturedFrame {
    pub fn new(image: RgbaImage, geometry: Option<Rect>, reference: Resolution) -> Self {
        let (scale_x, scale_y) = scale_factors(image.width(), image.height(), reference);
        let gray = image::imageops::grayscale(&image);
        Self {
            image,
            gray,
            scale_x,
            scale_y,
            geometry,
        }
    }

    /// Build a frame from raw RGBA bytes
    pub fn from_raw(
        frame_data: &[u8],
        width: u32,
        height: u32,
        geometry: Option<Rect>,
        reference: Resolution,
    ) -> Result<Self, VisionError> {
        let expected_size = width as usize * height as usize * 4;
        if frame_data.len() != expected_size || expected_size == 0 {
            return Err(VisionError::InvalidFrameData);
        }

        let image: RgbaImage = ImageBuffer::from_raw(width, height, frame_data.to_vec())
            .ok_or(VisionError::InvalidFrameData)?;
        Ok(Self::new(image, geometry, reference))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    /// Mean of both scale factors, used as the matcher's scale hint
    pub fn scale_hint(&self) -> f32 {
        ((self.scale_x + self.scale_y) / 2.0) as f32
    }

    pub fn geometry(&self) -> Option<Rect> {
        self.geometry
    }

    /// Scale factors for coordinates authored at `authored` instead of the
    /// reference resolution
    pub fn scale_for(&self, authored: Option<Resolution>) -> (f64, f64) {
        match authored {
            Some(res) => scale_factors(self.image.width(), self.image.height(), res),
            None => (self.scale_x, self.scale_y),
        }
    }

    /// Map a point from authoring space into frame pixels
    pub fn map_point(&self, x: i32, y: i32, authored: Option<Resolution>) -> (i32, i32) {
        let (sx, sy) = self.scale_for(authored);
        map_point(x, y, sx, sy)
    }

    /// Pixel at frame coordinates, `None` when out of bounds
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        let (width, height) = self.image.dimensions();
        if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
            return None;
        }
        Some(*self.image.get_pixel(x as u32, y as u32))
    }

    /// Grayscale crop clamped to the frame, `None` if nothing is left
    pub fn crop_gray(&self, x: i32, y: i32, width: u32, height: u32) -> Option<GrayImage> {
        let (frame_w, frame_h) = self.gray.dimensions();
        let x0 = x.clamp(0, frame_w as i32) as u32;
        let y0 = y.clamp(0, frame_h as i32) as u32;
        let x1 = (x as i64 + width as i64).clamp(0, frame_w as i64) as u32;
        let y1 = (y as i64 + height as i64).clamp(0, frame_h as i64) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(image::imageops::crop_imm(&self.gray, x0, y0, x1 - x0, y1 - y0).to_image())
    }
}

/// `captured / reference` on both axes
pub fn scale_factors(width: u32, height: u32, reference: Resolution) -> (f64, f64) {
    (
        width as f64 / reference.width as f64,
        height as f64 / reference.height as f64,
    )
}

/// Scale a reference-space point, truncating toward zero
pub fn map_point(x: i32, y: i32, scale_x: f64, scale_y: f64) -> (i32, i32) {
    ((x as f64 * scale_x) as i32, (y as f64 * scale_y) as i32)
}

/// Frame source adapter around a window target
pub struct FrameSource {
    target: Box<dyn WindowTarget>,
    mode: CaptureMode,
    reference: Resolution,
    restore_delay: Duration,
}

impl FrameSource {
    pub fn new(target: Box<dyn WindowTarget>, settings: &EngineSettings) -> Self {
        Self {
            target,
            mode: settings.capture_mode,
            reference: settings.reference,
            restore_delay: Duration::from_millis(settings.timings.restore_delay_ms),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn geometry(&self) -> Option<Rect> {
        self.target.geometry()
    }

    /// Capture one frame. `None` means "skip this tick".
    ///
    /// In interactive mode a minimized window is restored first; if that
    /// fails the window is read in background mode instead.
    pub fn capture(&mut self) -> Option<CapturedFrame> {
        let mut mode = self.mode;

        if mode == CaptureMode::Interactive && self.target.is_minimized() {
            match self.target.restore() {
                Ok(()) => {
                    log::debug!("Restored minimized target window");
                    thread::sleep(self.restore_delay);
                }
                Err(e) => {
                    log::warn!("Could not restore target window, reading it in background: {}", e);
                    mode = CaptureMode::Background;
                }
            }
        }

        let geometry = self.target.geometry();
        let grabbed = match mode {
            CaptureMode::Background => self.target.grab_window(),
            CaptureMode::Interactive => match geometry {
                Some(area) if !area.is_empty() => self.target.grab_screen(area),
                _ => {
                    log::debug!("Target window has no usable geometry");
                    return None;
                }
            },
        };

        match grabbed {
            Ok(image) if image.width() > 0 && image.height() > 0 => {
                Some(CapturedFrame::new(image, geometry, self.reference))
            }
            Ok(_) => {
                log::debug!("Capture returned an empty image");
                None
            }
            Err(e) => {
                log::debug!("Capture failed: {}", e);
                None
            }
        }
    }

    /// Fresh grab of a screen area (used when a frame crop is not available)
    pub fn grab_region(&mut self, area: Rect) -> Option<RgbaImage> {
        if area.is_empty() {
            return None;
        }
        match self.target.grab_screen(area) {
            Ok(image) => Some(image),
            Err(e) => {
                log::debug!("Region grab failed: {}", e);
                None
            }
        }
    }
}
