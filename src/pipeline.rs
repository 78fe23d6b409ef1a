use std::collections::HashSet;
use std::path::Path;

use image::{DynamicImage, GrayImage};
use tracing::{debug, info};

use crate::detect::detect;
use crate::engine::Recognizer;
use crate::parse::{parse, Measurement};
use crate::recognize::{attempt, recognize_area, select};
use crate::rectify::rectify;
use crate::types::{AnalysisResult, EdgeFlags, Piece, PipelineConfig, Region};

/// The only failure that surfaces to callers: the input image could not be
/// decoded. Everything else degrades to fewer or zero pieces.
#[derive(thiserror::Error, Debug)]
pub enum AnalyzeError {
    #[error("failed to decode input image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Full extraction pipeline over one photograph.
///
/// Stateless between calls: each analysis allocates its own regions,
/// candidates and pieces, so analyzing several images from separate
/// workers needs no extra locking.
pub struct Pipeline {
    engine: Box<dyn Recognizer>,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(engine: Box<dyn Recognizer>, cfg: PipelineConfig) -> Self {
        Self { engine, cfg }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn analyze_path(&self, path: impl AsRef<Path>) -> Result<AnalysisResult, AnalyzeError> {
        let image = image::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "analyzing image");
        Ok(self.analyze_image(&image))
    }

    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<AnalysisResult, AnalyzeError> {
        let image = image::load_from_memory(bytes)?;
        Ok(self.analyze_image(&image))
    }

    /// Runs rectify → detect → recognize → parse → dedupe over an already
    /// decoded image. Infallible by design; an empty piece list is a valid
    /// outcome, not an error.
    pub fn analyze_image(&self, image: &DynamicImage) -> AnalysisResult {
        let (orig_w, orig_h) = (image.width(), image.height());
        let rectified = rectify(&image.to_luma8(), &self.cfg.rectify);
        let working = &rectified.image;
        let inv_scale = 1.0 / rectified.scale;

        let regions = detect(working, &self.cfg.detect);
        info!(regions = regions.len(), "region detection finished");

        let mut seen = HashSet::new();
        let mut pieces = Vec::new();

        for region in &regions {
            let candidates = attempt(
                self.engine.as_ref(),
                working,
                region,
                &self.cfg.language,
                &self.cfg.recognition,
            );
            let text = select(&candidates);
            let mut found = parse(&text, &self.cfg.parse);

            if found.is_empty() {
                // Measurements split over two visual rows inside one cell
                // are often recovered by re-reading a taller strip.
                if let Some(strip_text) = self.retry_expanded_strip(working, region) {
                    found = parse(&strip_text, &self.cfg.parse);
                }
            }

            let mapped = region.scale_clamped(inv_scale, orig_w, orig_h);
            for m in found {
                push_unique(&mut pieces, &mut seen, m, mapped);
            }
        }

        if pieces.is_empty() {
            info!("no pieces from regions; running whole-image fallback");
            let text = recognize_area(
                self.engine.as_ref(),
                working,
                None,
                &self.cfg.language,
                self.cfg.recognition.global_timeout,
                &self.cfg.recognition,
            );
            if let Some(text) = text {
                let full = Region::new(0, 0, orig_w, orig_h);
                for m in parse(&text, &self.cfg.parse) {
                    push_unique(&mut pieces, &mut seen, m, full);
                }
            }
        }

        info!(pieces = pieces.len(), "analysis finished");
        AnalysisResult {
            pieces,
            regions: regions
                .iter()
                .map(|r| r.scale_clamped(inv_scale, orig_w, orig_h))
                .collect(),
            image_width: orig_w,
            image_height: orig_h,
        }
    }

    /// One block-layout pass over the region expanded vertically by
    /// `strip_expand_frac` of its height on each side.
    fn retry_expanded_strip(&self, working: &GrayImage, region: &Region) -> Option<String> {
        let (_, h) = working.dimensions();
        let pad = (region.height as f32 * self.cfg.recognition.strip_expand_frac) as u32;
        let y0 = region.y.saturating_sub(pad);
        let y1 = (region.bottom() + pad).min(h);
        let strip = Region::new(region.x, y0, region.width, y1.saturating_sub(y0).max(1));
        debug!(region = ?region, strip = ?strip, "retrying with expanded strip");
        recognize_area(
            self.engine.as_ref(),
            working,
            Some(&strip),
            &self.cfg.language,
            self.cfg.recognition.line_timeout,
            &self.cfg.recognition,
        )
    }
}

/// Appends a piece unless an identical `(quantity, length, width, x, y)`
/// key was already emitted.
fn push_unique(
    pieces: &mut Vec<Piece>,
    seen: &mut HashSet<(u32, u32, u32, u32, u32)>,
    m: Measurement,
    region: Region,
) {
    if seen.insert((m.quantity, m.length, m.width, region.x, region.y)) {
        pieces.push(Piece {
            quantity: m.quantity,
            length: m.length,
            width: m.width,
            edges: EdgeFlags::default(),
            source_text: m.matched,
            region: Some(region),
        });
    }
}
