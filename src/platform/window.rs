use image::RgbaImage;
use xcap::{Monitor, Window};

use crate::vision::{Rect, VisionError, WindowTarget};

fn capture_error(e: impl std::fmt::Display) -> VisionError {
    VisionError::Capture(e.to_string())
}

/// A top-level window found by title, captured through `xcap`
#[derive(Debug, Clone)]
pub struct XcapWindow {
    id: u32,
    title: String,
}

impl XcapWindow {
    /// First visible window whose title contains `title` (case-insensitive)
    pub fn find(title: &str) -> Result<Self, VisionError> {
        let needle = title.to_lowercase();
        let windows = Window::all().map_err(capture_error)?;
        let window = windows
            .iter()
            .find(|w| w.title().is_ok_and(|t| t.to_lowercase().contains(&needle)))
            .ok_or_else(|| VisionError::Capture(format!("no window titled '{}'", title)))?;

        let found = Self {
            id: window.id().map_err(capture_error)?,
            title: window.title().map_err(capture_error)?,
        };
        log::info!("Attached to window '{}' ({})", found.title, found.id);
        Ok(found)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn window(&self) -> Result<Window, VisionError> {
        Window::all()
            .map_err(capture_error)?
            .into_iter()
            .find(|w| w.id().is_ok_and(|id| id == self.id))
            .ok_or_else(|| VisionError::Capture(format!("window '{}' is gone", self.title)))
    }
}

/// Convert through raw bytes so xcap's `image` version does not leak
fn to_rgba(width: u32, height: u32, raw: Vec<u8>) -> Result<RgbaImage, VisionError> {
    RgbaImage::from_raw(width, height, raw).ok_or(VisionError::InvalidFrameData)
}

impl WindowTarget for XcapWindow {
    fn geometry(&self) -> Option<Rect> {
        let window = self.window().ok()?;
        Some(Rect::new(
            window.x().ok()?,
            window.y().ok()?,
            window.width().ok()?,
            window.height().ok()?,
        ))
    }

    fn is_minimized(&self) -> bool {
        self.window()
            .and_then(|w| w.is_minimized().map_err(capture_error))
            .unwrap_or(false)
    }

    fn restore(&mut self) -> Result<(), VisionError> {
        Err(VisionError::Capture(
            "restoring minimized windows is not available on this backend".to_string(),
        ))
    }

    fn grab_screen(&mut self, area: Rect) -> Result<RgbaImage, VisionError> {
        let monitors = Monitor::all().map_err(capture_error)?;
        let monitor = monitors
            .iter()
            .find(|m| {
                let (Ok(x), Ok(y), Ok(w), Ok(h)) = (m.x(), m.y(), m.width(), m.height()) else {
                    return false;
                };
                area.left >= x && area.top >= y && area.left < x + w as i32 && area.top < y + h as i32
            })
            .ok_or_else(|| VisionError::Capture(format!("no monitor contains {:?}", area)))?;

        let origin = (monitor.x().map_err(capture_error)?, monitor.y().map_err(capture_error)?);
        let shot = monitor.capture_image().map_err(capture_error)?;
        let screen = to_rgba(shot.width(), shot.height(), shot.into_raw())?;

        let x = (area.left - origin.0) as u32;
        let y = (area.top - origin.1) as u32;
        let width = area.width.min(screen.width().saturating_sub(x));
        let height = area.height.min(screen.height().saturating_sub(y));
        Ok(image::imageops::crop_imm(&screen, x, y, width, height).to_image())
    }

    fn grab_window(&mut self) -> Result<RgbaImage, VisionError> {
        let shot = self.window()?.capture_image().map_err(capture_error)?;
        to_rgba(shot.width(), shot.height(), shot.into_raw())
    }
}
