use std::time::Duration;

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use tracing::{debug, warn};

use crate::engine::{LayoutMode, RecognitionRequest, Recognizer};
use crate::types::{RecognitionConfig, Region};

/// Whitelist for single-line attempts: digits and the dimension separator.
pub const WHITELIST_NUMERIC: &str = "0123456789xX";
/// Extended whitelist allowing quantity separators, for block and sparse
/// layouts where whole cells are read at once.
pub const WHITELIST_EXTENDED: &str = "0123456789xX=:-";

/// Ordered attempt plan: most constrained layout first.
const ATTEMPTS: &[(LayoutMode, &str)] = &[
    (LayoutMode::SingleLine, WHITELIST_NUMERIC),
    (LayoutMode::Block, WHITELIST_EXTENDED),
    (LayoutMode::Sparse, WHITELIST_EXTENDED),
];

/// Text produced by one recognition attempt over one region.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Index into the attempt plan that produced this text.
    pub attempt: usize,
    pub text: String,
}

/// Runs the ordered attempt plan over one region crop.
///
/// A per-attempt timeout or engine failure is logged and skipped, never
/// propagated. When no attempt produces usable text, one extra pass runs
/// over a globally-binarized copy of the crop.
pub fn attempt(
    engine: &dyn Recognizer,
    image: &GrayImage,
    region: &Region,
    language: &str,
    cfg: &RecognitionConfig,
) -> Vec<Candidate> {
    let crop = upscale_small(crop_padded(image, region, cfg), cfg);

    let mut candidates = Vec::new();
    for (i, (layout, whitelist)) in ATTEMPTS.iter().enumerate() {
        if let Some(text) = run_attempt(engine, &crop, *layout, whitelist, language, cfg.line_timeout, i) {
            candidates.push(Candidate { attempt: i, text });
        }
    }

    if candidates.is_empty() {
        // Last resort: a hard global threshold sometimes recovers strokes
        // the adaptive contrast pass washed out.
        let level = otsu_level(&crop);
        let binarized = threshold(&crop, level, ThresholdType::Binary);
        let i = ATTEMPTS.len();
        if let Some(text) = run_attempt(
            engine,
            &binarized,
            LayoutMode::SingleLine,
            WHITELIST_NUMERIC,
            language,
            cfg.line_timeout,
            i,
        ) {
            candidates.push(Candidate { attempt: i, text });
        }
    }

    debug!(region = ?region, count = candidates.len(), "recognition attempts finished");
    candidates
}

/// One recognition pass over an arbitrary area: the expanded retry strip,
/// or the whole image when `region` is `None`.
pub fn recognize_area(
    engine: &dyn Recognizer,
    image: &GrayImage,
    region: Option<&Region>,
    language: &str,
    timeout: Duration,
    cfg: &RecognitionConfig,
) -> Option<String> {
    let crop = match region {
        Some(r) => upscale_small(crop_padded(image, r, cfg), cfg),
        None => image.clone(),
    };
    run_attempt(engine, &crop, LayoutMode::Block, WHITELIST_EXTENDED, language, timeout, usize::MAX)
}

fn run_attempt(
    engine: &dyn Recognizer,
    crop: &GrayImage,
    layout: LayoutMode,
    whitelist: &str,
    language: &str,
    timeout: Duration,
    attempt: usize,
) -> Option<String> {
    let request = RecognitionRequest {
        layout,
        whitelist,
        language,
        timeout,
    };
    match engine.recognize(crop, &request) {
        Ok(raw) => {
            let text = sanitize(&raw);
            (!text.is_empty()).then_some(text)
        }
        Err(err) if err.is_timeout() => {
            warn!(attempt, "recognition attempt timed out");
            None
        }
        Err(err) => {
            warn!(attempt, error = %err, "recognition attempt failed");
            None
        }
    }
}

/// Picks the candidate most useful for measurement parsing: the one with
/// the most digits, with a bonus for containing a dimension separator.
/// Ties go to the earliest attempt. Empty string when there is nothing.
pub fn select(candidates: &[Candidate]) -> String {
    let mut best: Option<(usize, usize)> = None; // (index, score)
    for (i, c) in candidates.iter().enumerate() {
        let s = score(&c.text);
        if best.map_or(true, |(_, bs)| s > bs) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| candidates[i].text.clone()).unwrap_or_default()
}

/// Digit count, plus 2 when the text carries an `x` separator.
pub fn score(text: &str) -> usize {
    let digits = text.chars().filter(char::is_ascii_digit).count();
    let separator = if text.contains(['x', 'X']) { 2 } else { 0 };
    digits + separator
}

/// Collapses engine output to the characters the parser understands;
/// everything else becomes whitespace.
pub fn sanitize(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| match c {
            '0'..='9' | 'x' | 'X' | '=' | ':' | '-' => c,
            '\u{00d7}' => 'x', // multiplication sign
            _ => ' ',
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Crops the region with proportional padding, clamped to image bounds.
fn crop_padded(image: &GrayImage, region: &Region, cfg: &RecognitionConfig) -> GrayImage {
    let (w, h) = image.dimensions();
    let pad_x = (region.width as f32 * cfg.pad_frac_x) as u32 + cfg.pad_px;
    let pad_y = (region.height as f32 * cfg.pad_frac_y) as u32 + cfg.pad_px;
    let x0 = region.x.saturating_sub(pad_x);
    let y0 = region.y.saturating_sub(pad_y);
    let x1 = (region.right() + pad_x).min(w);
    let y1 = (region.bottom() + pad_y).min(h);
    imageops::crop_imm(image, x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1)).to_image()
}

/// Upscales short crops so thin handwriting has enough pixels to recognize.
fn upscale_small(crop: GrayImage, cfg: &RecognitionConfig) -> GrayImage {
    let (w, h) = crop.dimensions();
    if h >= cfg.min_crop_height || cfg.upscale <= 1 {
        return crop;
    }
    imageops::resize(&crop, w * cfg.upscale, h * cfg.upscale, FilterType::CatmullRom)
}
