//! Numeric OCR
//!
//! Recognition itself sits behind [`DigitReader`]; this module owns the
//! preprocessing (upscale, Otsu binarization), the lazily constructed reader
//! handle, number extraction and the comparison operators used by OCR
//! triggers.

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::GrayImage;
use imageproc::contrast::otsu_level;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;

/// First number in recognized text: decimals with optional sign, or integers
const NUMBER_PATTERN: &str = r"[-+]?\d*\.\d+|\d+";

static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(NUMBER_PATTERN).ok());

/// Tolerance used by `=` and `!=`
pub const EQUALITY_EPSILON: f64 = 0.001;

/// Black-box numeric text recognizer
pub trait DigitReader: Send {
    /// Recognize text fragments in a binarized image
    fn recognize_digits(&mut self, image: &GrayImage) -> Result<Vec<String>, OcrError>;
}

/// Builds a reader on first use
pub type ReaderFactory = Box<dyn Fn() -> Result<Box<dyn DigitReader>, OcrError> + Send>;

/// Lazily constructed OCR handle.
///
/// Construction is deferred to the first OCR evaluation and happens once;
/// the handle can be moved to the next engine so it is never built twice.
#[derive(Default)]
pub struct LazyOcr {
    reader: OnceCell<Box<dyn DigitReader>>,
    factory: Option<ReaderFactory>,
}

impl LazyOcr {
    /// Handle that builds its reader with `factory` when first needed
    pub fn new(factory: ReaderFactory) -> Self {
        Self {
            reader: OnceCell::new(),
            factory: Some(factory),
        }
    }

    /// Handle around an already constructed reader
    pub fn with_reader(reader: Box<dyn DigitReader>) -> Self {
        Self {
            reader: OnceCell::with_value(reader),
            factory: None,
        }
    }

    /// Handle with no backend; every OCR read fails with `Unavailable`
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.reader.get().is_some()
    }

    /// The reader, constructing it on first call
    pub fn reader(&mut self) -> Result<&mut Box<dyn DigitReader>, OcrError> {
        let factory = &self.factory;
        self.reader.get_or_try_init(|| match factory {
            Some(build) => {
                log::info!("Initializing OCR reader");
                build()
            }
            None => Err(OcrError::Unavailable("no OCR backend configured".to_string())),
        })?;
        self.reader
            .get_mut()
            .ok_or_else(|| OcrError::Unavailable("reader not initialized".to_string()))
    }
}

impl fmt::Debug for LazyOcr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyOcr")
            .field("initialized", &self.is_initialized())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Upscale and binarize a grayscale crop for recognition
pub fn preprocess(crop: &GrayImage, upscale: u32) -> GrayImage {
    let factor = upscale.max(1);
    let (w, h) = crop.dimensions();
    let mut large = image::imageops::resize(crop, w * factor, h * factor, FilterType::CatmullRom);

    let level = otsu_level(&large);
    for pixel in large.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    large
}

/// First number found in the recognized fragments
pub fn extract_number(fragments: &[String]) -> Option<f64> {
    let text = fragments.join(" ");
    let found = NUMBER.as_ref()?.find(&text)?;
    found.as_str().parse().ok()
}

/// Preprocess `crop`, run the reader and pull out the first number
pub fn read_number(ocr: &mut LazyOcr, crop: &GrayImage, upscale: u32) -> Result<Option<f64>, OcrError> {
    if crop.width() == 0 || crop.height() == 0 {
        return Ok(None);
    }
    let prepared = preprocess(crop, upscale);
    let fragments = ocr.reader()?.recognize_digits(&prepared)?;
    log::debug!("OCR raw: {:?}", fragments);
    Ok(extract_number(&fragments))
}

/// Comparison operator of an OCR trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
    NotEqual,
}

impl Comparison {
    /// Whether `value <op> target` holds
    pub fn holds(self, value: f64, target: f64) -> bool {
        match self {
            Comparison::Greater => value > target,
            Comparison::Less => value < target,
            Comparison::Equal => (value - target).abs() < EQUALITY_EPSILON,
            Comparison::GreaterOrEqual => value >= target,
            Comparison::LessOrEqual => value <= target,
            Comparison::NotEqual => (value - target).abs() > EQUALITY_EPSILON,
        }
    }
}

impl FromStr for Comparison {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparison::Greater),
            "<" => Ok(Comparison::Less),
            "=" | "==" => Ok(Comparison::Equal),
            ">=" => Ok(Comparison::GreaterOrEqual),
            "<=" => Ok(Comparison::LessOrEqual),
            "!=" => Ok(Comparison::NotEqual),
            other => Err(OcrError::Recognition(format!("unknown comparison '{}'", other))),
        }
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR unavailable: {0}")]
    Unavailable(String),
    #[error("OCR recognition failed: {0}")]
    Recognition(String),
}


#[cfg(test)]
mod tests {
    use super::fakes::FixedReader;
    use super::*;
    use image::Luma;
    use std::sync::{Arc, Mutex};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_first_number() {
        assert_eq!(extract_number(&strings(&["1,250"])), Some(1.0));
        assert_eq!(extract_number(&strings(&["HP", "-3.5", "7"])), Some(-3.5));
        assert_eq!(extract_number(&strings(&[".75"])), Some(0.75));
        assert_eq!(extract_number(&strings(&["420"])), Some(420.0));
        assert_eq!(extract_number(&strings(&["--", "."])), None);
        assert_eq!(extract_number(&[]), None);
    }

    #[test]
    fn test_comparisons() {
        let cmp = |op: &str, v: f64, t: f64| op.parse::<Comparison>().unwrap().holds(v, t);
        assert!(cmp(">", 5.0, 4.0));
        assert!(!cmp(">", 4.0, 4.0));
        assert!(cmp("<", 3.0, 4.0));
        assert!(cmp("=", 4.0005, 4.0));
        assert!(!cmp("=", 4.01, 4.0));
        assert!(cmp(">=", 4.0, 4.0));
        assert!(cmp("<=", 4.0, 4.0));
        assert!(cmp("!=", 4.01, 4.0));
        assert!(!cmp("!=", 4.0, 4.0));
        assert!("~".parse::<Comparison>().is_err());
    }

    #[test]
    fn test_preprocess_upscales_and_binarizes() {
        let crop = GrayImage::from_fn(6, 4, |x, _| if x < 3 { Luma([40]) } else { Luma([210]) });
        let out = preprocess(&crop, 3);

        assert_eq!(out.dimensions(), (18, 12));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(17, 11)[0], 255);
    }

    #[test]
    fn test_reader_built_once() {
        let builds = Arc::new(Mutex::new(0));
        let counter = builds.clone();
        let mut ocr = LazyOcr::new(Box::new(move || {
            *counter.lock().unwrap() += 1;
            Ok(Box::new(FixedReader::new(&["12"])) as Box<dyn DigitReader>)
        }));
        assert!(!ocr.is_initialized());

        let crop = GrayImage::from_fn(4, 4, |x, _| Luma([(x * 60) as u8]));
        assert_eq!(read_number(&mut ocr, &crop, 3).unwrap(), Some(12.0));
        assert_eq!(read_number(&mut ocr, &crop, 3).unwrap(), Some(12.0));

        assert!(ocr.is_initialized());
        assert_eq!(*builds.lock().unwrap(), 1);
    }

    #[test]
    fn test_unavailable_backend() {
        let mut ocr = LazyOcr::unavailable();
        let crop = GrayImage::new(3, 3);
        assert!(matches!(
            read_number(&mut ocr, &crop, 3),
            Err(OcrError::Unavailable(_))
        ));
    }
}
