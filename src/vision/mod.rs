//! Vision and image processing module
//!
//! Frame acquisition from the target window, multi-scale template matching,
//! the template cache and numeric OCR.

pub mod capture;
pub mod matcher;
pub mod ocr;
pub mod templates;

pub use capture::{CaptureMode, CapturedFrame, FrameSource, Rect, Resolution, WindowTarget};
pub use matcher::{MatchResult, Matcher};
pub use ocr::{Comparison, DigitReader, LazyOcr, OcrError};
pub use templates::TemplateCache;

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Failed to load template {name}: {reason}")]
    TemplateLoad { name: String, reason: String },
    #[error("Capture failed: {0}")]
    Capture(String),
    #[error("Invalid frame data")]
    InvalidFrameData,
    #[error("Failed to process image: {0}")]
    ImageProcessing(String),
}
