//! Multi-scale template matching
//!
//! Scores are zero-mean normalized cross-correlation, in `[-1, 1]`. Each
//! candidate scale is searched coarse to fine: an exhaustive pass on a
//! downsampled copy of frame and template, then a small window around the
//! best coarse hits on every finer level down to full resolution. Window sums
//! of the coarse frame come from summed-area tables.

use std::collections::HashMap;

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use ndarray::Array2;

use crate::config::settings::MatcherSettings;

/// Smallest template side kept on the coarsest level
const MIN_COARSE_SIDE: u32 = 6;
/// Deepest pyramid level searched
const MAX_LEVELS: usize = 5;
/// Coarse hits carried into refinement
const COARSE_CANDIDATES: usize = 8;
/// Refinement window half-width, in pixels of the finer level
const REFINE_RADIUS: u32 = 2;

/// Best match found across all sampled scales
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Correlation score in `[-1, 1]`
    pub confidence: f32,
    /// Top-left corner in frame pixels
    pub location: (u32, u32),
    /// Scale factor applied to the template
    pub scale: f32,
    /// Size of the resized template, i.e. of the matched region
    pub size: (u32, u32),
}

impl MatchResult {
    /// Center of the matched region in frame pixels
    pub fn center(&self) -> (u32, u32) {
        (
            self.location.0 + self.size.0 / 2,
            self.location.1 + self.size.1 / 2,
        )
    }
}

/// Confidence of `result`, or a floor no threshold accepts when nothing matched
pub fn confidence_of(result: Option<&MatchResult>) -> f32 {
    result.map_or(f32::NEG_INFINITY, |r| r.confidence)
}

/// Scale-band template matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    scale_min: f32,
    scale_max: f32,
    steps: u32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(&MatcherSettings::default())
    }
}

impl Matcher {
    pub fn new(settings: &MatcherSettings) -> Self {
        Self {
            scale_min: settings.scale_min,
            scale_max: settings.scale_max,
            steps: settings.scale_steps,
        }
    }

    /// Evenly spaced scale factors around `hint`, both ends included
    pub fn scales(&self, hint: f32) -> Vec<f32> {
        let lo = hint * self.scale_min;
        let hi = hint * self.scale_max;
        match self.steps {
            0 | 1 => vec![hint],
            n => {
                let step = (hi - lo) / (n - 1) as f32;
                (0..n).map(|i| lo + step * i as f32).collect()
            }
        }
    }

    /// Locate `template` in `frame`.
    ///
    /// Returns `None` when no sampled scale produced a template that fits
    /// inside the frame.
    pub fn locate(&self, frame: &GrayImage, template: &GrayImage, hint: f32) -> Option<MatchResult> {
        let (tw, th) = template.dimensions();
        let (fw, fh) = frame.dimensions();
        if tw == 0 || th == 0 {
            return None;
        }

        let mut pyramid = Pyramid::new(frame);
        // Scales that shrink to the same coarse size share one exhaustive pass
        let mut coarse: HashMap<(usize, u32, u32), Vec<(f32, (u32, u32))>> = HashMap::new();
        let mut best: Option<MatchResult> = None;

        for scale in self.scales(hint) {
            let w = (tw as f32 * scale) as u32;
            let h = (th as f32 * scale) as u32;
            if w == 0 || h == 0 || w > fw || h > fh {
                continue;
            }

            let scaled = if (w, h) == (tw, th) {
                template.clone()
            } else {
                image::imageops::resize(template, w, h, FilterType::Triangle)
            };
            let chain = template_chain(scaled, depth_for(w, h));
            let top = chain.len() - 1;
            let top_template = &chain[top];

            let key = (top, top_template.image.width(), top_template.image.height());
            let hits = coarse
                .entry(key)
                .or_insert_with(|| {
                    pyramid.ensure_tables(top);
                    coarse_hits(pyramid.image(top), pyramid.tables(top), top_template)
                })
                .clone();

            let scored = if top == 0 {
                hits.first().copied()
            } else {
                hits.iter()
                    .filter_map(|&(_, at)| refine(&pyramid, &chain, at))
                    .fold(None, |acc: Option<(f32, (u32, u32))>, hit| match acc {
                        Some(a) if a.0 >= hit.0 => Some(a),
                        _ => Some(hit),
                    })
            };

            if let Some((confidence, location)) = scored {
                if best.map_or(true, |b| confidence > b.confidence) {
                    best = Some(MatchResult {
                        confidence,
                        location,
                        scale,
                        size: (w, h),
                    });
                }
            }
        }

        best
    }
}

/// Pyramid levels to use for a `w`x`h` template
fn depth_for(w: u32, h: u32) -> usize {
    let side = w.min(h);
    let mut depth = 0;
    while depth < MAX_LEVELS && (side >> (depth + 1)) >= MIN_COARSE_SIDE {
        depth += 1;
    }
    depth
}

/// 2x2 box downsample, dropping an odd last row/column
fn halve(image: &GrayImage) -> GrayImage {
    let (w, h) = (image.width() / 2, image.height() / 2);
    GrayImage::from_fn(w, h, |x, y| {
        let (sx, sy) = (x * 2, y * 2);
        let total = image.get_pixel(sx, sy)[0] as u32
            + image.get_pixel(sx + 1, sy)[0] as u32
            + image.get_pixel(sx, sy + 1)[0] as u32
            + image.get_pixel(sx + 1, sy + 1)[0] as u32;
        Luma([((total + 2) / 4) as u8])
    })
}

/// Frame downsampled level by level on demand
struct Pyramid<'a> {
    base: &'a GrayImage,
    halves: Vec<GrayImage>,
    tables: Vec<Option<SummedArea>>,
}

impl<'a> Pyramid<'a> {
    fn new(base: &'a GrayImage) -> Self {
        Self {
            base,
            halves: Vec::new(),
            tables: Vec::new(),
        }
    }

    fn ensure(&mut self, level: usize) {
        while self.halves.len() < level {
            let next = halve(self.image(self.halves.len()));
            self.halves.push(next);
        }
    }

    fn ensure_tables(&mut self, level: usize) {
        self.ensure(level);
        if self.tables.len() <= level {
            self.tables.resize_with(level + 1, || None);
        }
        if self.tables[level].is_none() {
            let tables = SummedArea::new(self.image(level));
            self.tables[level] = Some(tables);
        }
    }

    fn image(&self, level: usize) -> &GrayImage {
        match level {
            0 => self.base,
            n => &self.halves[n - 1],
        }
    }

    fn tables(&self, level: usize) -> Option<&SummedArea> {
        self.tables.get(level).and_then(Option::as_ref)
    }
}

/// Template pixels with the statistics the score needs
struct Prepared {
    image: GrayImage,
    sum: f64,
    /// `Σt² - (Σt)²/n`
    var: f64,
}

impl Prepared {
    fn new(image: GrayImage) -> Self {
        let n = image.width() as f64 * image.height() as f64;
        let (sum, sq) = image.pixels().fold((0.0f64, 0.0f64), |(s, s2), p| {
            let v = p[0] as f64;
            (s + v, s2 + v * v)
        });
        Self {
            var: sq - sum * sum / n,
            image,
            sum,
        }
    }
}

/// Full-resolution template followed by `depth` halvings
fn template_chain(scaled: GrayImage, depth: usize) -> Vec<Prepared> {
    let mut chain = vec![Prepared::new(scaled)];
    for _ in 0..depth {
        let next = halve(&chain[chain.len() - 1].image);
        chain.push(Prepared::new(next));
    }
    chain
}

/// Running sums of the frame and of its squares, one row/column of padding
struct SummedArea {
    sum: Array2<f64>,
    sq: Array2<f64>,
}

impl SummedArea {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let mut sum = Array2::<f64>::zeros((h as usize + 1, w as usize + 1));
        let mut sq = Array2::<f64>::zeros((h as usize + 1, w as usize + 1));

        for y in 0..h as usize {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w as usize {
                let v = image.get_pixel(x as u32, y as u32)[0] as f64;
                row += v;
                row_sq += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row;
                sq[[y + 1, x + 1]] = sq[[y, x + 1]] + row_sq;
            }
        }

        Self { sum, sq }
    }

    fn window(table: &Array2<f64>, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[[y + h, x + w]] - table[[y, x + w]] - table[[y + h, x]] + table[[y, x]]
    }
}

/// Zero-mean NCC of `template` placed at `(x, y)`
fn score_at(frame: &GrayImage, tables: Option<&SummedArea>, template: &Prepared, x: u32, y: u32) -> f32 {
    let (tw, th) = (template.image.width() as usize, template.image.height() as usize);
    let fw = frame.width() as usize;
    let (x, y) = (x as usize, y as usize);
    let pixels = frame.as_raw();
    let tpl = template.image.as_raw();

    let mut dot: u64 = 0;
    let mut sum: u64 = 0;
    let mut sq: u64 = 0;
    for row in 0..th {
        let start = (y + row) * fw + x;
        let frame_row = &pixels[start..start + tw];
        let tpl_row = &tpl[row * tw..(row + 1) * tw];
        for (&a, &b) in frame_row.iter().zip(tpl_row) {
            dot += a as u64 * b as u64;
        }
        if tables.is_none() {
            for &a in frame_row {
                sum += a as u64;
                sq += a as u64 * a as u64;
            }
        }
    }

    let n = (tw * th) as f64;
    let (i_sum, i_sq) = match tables {
        Some(t) => (
            SummedArea::window(&t.sum, x, y, tw, th),
            SummedArea::window(&t.sq, x, y, tw, th),
        ),
        None => (sum as f64, sq as f64),
    };
    let i_var = i_sq - i_sum * i_sum / n;

    // Flat windows or flat templates carry no correlation
    if i_var < 1e-3 || template.var < 1e-3 {
        return 0.0;
    }
    let numerator = dot as f64 - i_sum * template.sum / n;
    (numerator / (i_var * template.var).sqrt()).clamp(-1.0, 1.0) as f32
}

/// Exhaustive pass: the best scores at well separated positions, best first
fn coarse_hits(frame: &GrayImage, tables: Option<&SummedArea>, template: &Prepared) -> Vec<(f32, (u32, u32))> {
    let max_x = frame.width() - template.image.width();
    let max_y = frame.height() - template.image.height();
    let apart = REFINE_RADIUS * 2;

    let mut hits: Vec<(f32, (u32, u32))> = Vec::with_capacity(COARSE_CANDIDATES + 1);
    for y in 0..=max_y {
        for x in 0..=max_x {
            let score = score_at(frame, tables, template, x, y);
            if hits.len() == COARSE_CANDIDATES && score <= hits[hits.len() - 1].0 {
                continue;
            }

            let near = hits
                .iter()
                .position(|&(_, (hx, hy))| hx.abs_diff(x) <= apart && hy.abs_diff(y) <= apart);
            match near {
                Some(i) if hits[i].0 >= score => continue,
                Some(i) => {
                    hits.remove(i);
                }
                None => {}
            }

            let slot = hits.iter().position(|&(s, _)| score > s).unwrap_or(hits.len());
            hits.insert(slot, (score, (x, y)));
            hits.truncate(COARSE_CANDIDATES);
        }
    }
    hits
}

/// Best score in a window around `(x, y)`, clamped to valid positions
fn window_best(frame: &GrayImage, template: &Prepared, x: u32, y: u32) -> Option<(f32, (u32, u32))> {
    let max_x = frame.width().checked_sub(template.image.width())?;
    let max_y = frame.height().checked_sub(template.image.height())?;
    let (x0, x1) = (x.saturating_sub(REFINE_RADIUS).min(max_x), (x + REFINE_RADIUS).min(max_x));
    let (y0, y1) = (y.saturating_sub(REFINE_RADIUS).min(max_y), (y + REFINE_RADIUS).min(max_y));

    let mut best: Option<(f32, (u32, u32))> = None;
    for wy in y0..=y1 {
        for wx in x0..=x1 {
            let score = score_at(frame, None, template, wx, wy);
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, (wx, wy)));
            }
        }
    }
    best
}

/// Follow a coarse hit down the pyramid to full resolution
fn refine(pyramid: &Pyramid, chain: &[Prepared], coarse_at: (u32, u32)) -> Option<(f32, (u32, u32))> {
    let mut at = coarse_at;
    let mut found = None;
    for level in (0..chain.len() - 1).rev() {
        let (score, pos) = window_best(pyramid.image(level), &chain[level], at.0 * 2, at.1 * 2)?;
        at = pos;
        found = Some((score, pos));
    }
    found
}


#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;

    #[test]
    fn test_scales_span_band_inclusive() {
        let scales = Matcher::default().scales(1.0);
        assert_eq!(scales.len(), 20);
        assert!((scales[0] - 0.8).abs() < 1e-6);
        assert!((scales[19] - 1.2).abs() < 1e-5);

        let scaled = Matcher::default().scales(2.0);
        assert!((scaled[0] - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_exact_copy_found_at_known_offset() {
        let template = textured(24, 18, 7);
        let frame = with_patch(&textured(120, 90, 1), &template, 37, 52);

        let result = Matcher::default()
            .locate(&gray(&frame), &gray(&template), 1.0)
            .unwrap();

        assert!(result.confidence >= 0.99, "confidence {}", result.confidence);
        assert!((result.scale - 1.0).abs() < 0.05);
        assert!((result.location.0 as i32 - 37).abs() <= 1);
        assert!((result.location.1 as i32 - 52).abs() <= 1);
        assert_eq!(result.size, (24, 18));
        assert_eq!(result.center(), (49, 61));
    }

    #[test]
    fn test_absent_template_scores_low() {
        let template = textured(24, 18, 99);
        let frame = textured(120, 90, 1);

        let result = Matcher::default()
            .locate(&gray(&frame), &gray(&template), 1.0)
            .unwrap();
        assert!(result.confidence < 0.8, "confidence {}", result.confidence);
    }

    #[test]
    fn test_template_larger_than_frame_has_no_window() {
        let frame = gray(&textured(20, 20, 1));
        let template = gray(&textured(40, 40, 2));

        let result = Matcher::default().locate(&frame, &template, 1.0);
        assert!(result.is_none());
        assert!(confidence_of(result.as_ref()) < -1.0);
    }

    #[test]
    fn test_odd_offsets_survive_the_coarse_pass() {
        let template = textured(40, 28, 11);
        let background = textured(300, 200, 2);

        for (x, y) in [(1, 1), (143, 77), (259, 171)] {
            let frame = with_patch(&background, &template, x, y);
            let result = Matcher::default()
                .locate(&gray(&frame), &gray(&template), 1.0)
                .unwrap();
            assert!(result.confidence >= 0.99, "at ({}, {}): {}", x, y, result.confidence);
            assert_eq!(result.location, (x, y));
        }
    }

    #[test]
    fn test_full_hd_frame_is_fast() {
        let template = textured(120, 60, 8);
        let frame = gray(&with_patch(&textured(1920, 1080, 3), &template, 1001, 613));
        let template = gray(&template);

        let started = std::time::Instant::now();
        let result = Matcher::default().locate(&frame, &template, 1.0).unwrap();
        let elapsed = started.elapsed();

        assert!(result.confidence >= 0.99, "confidence {}", result.confidence);
        assert_eq!(result.location, (1001, 613));
        // Generous enough for unoptimized test builds
        assert!(elapsed < std::time::Duration::from_secs(5), "took {:?}", elapsed);
    }

    #[test]
    fn test_flat_regions_score_zero() {
        let frame = flat_gray(50, 50, 128);
        let template = gray(&textured(10, 10, 3));

        let result = Matcher::default().locate(&frame, &template, 1.0).unwrap();
        assert_eq!(result.confidence, 0.0);
    }
}
