//! # cutlist-ocr
//!
//! Extracts structured cut-lists from photographs of hand-written or
//! printed woodworking part lists: each detected entry becomes a
//! `(quantity, length, width)` piece with its source location in the image.
//!
//! The pipeline rectifies the photo (downscale, local contrast, denoise,
//! deskew), detects candidate text regions, runs the external recognition
//! engine over each region with several layout configurations, selects the
//! most measurement-like reading, parses it, and deduplicates the result.
//! Recognition is a trait seam; the default engine drives the system
//! `tesseract` binary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cutlist_ocr::CutlistOcr;
//!
//! let ocr = CutlistOcr::new();
//! let result = ocr.extract_pieces("cutlist.jpg")?;
//!
//! for piece in &result.pieces {
//!     println!("{} x {}x{} mm", piece.quantity, piece.length, piece.width);
//! }
//! # Ok::<(), cutlist_ocr::AnalyzeError>(())
//! ```

// Core modules
mod detect;
mod engine;
mod overlay;
mod parse;
mod pipeline;
mod recognize;
mod rectify;
mod types;

// Public API exports
pub use crate::detect::detect;
pub use crate::engine::{
    LayoutMode, RecognitionRequest, RecognizeError, Recognizer, TesseractEngine,
};
pub use crate::overlay::{draw_overlay, OverlayConfig};
pub use crate::parse::{parse, Measurement};
pub use crate::pipeline::{AnalyzeError, Pipeline};
pub use crate::rectify::{rectify, Rectified};
pub use crate::types::{
    AnalysisResult, DetectConfig, EdgeFlags, ParseConfig, Piece, PipelineConfig,
    RecognitionConfig, RectifyConfig, Region,
};

use std::path::Path;

use image::DynamicImage;

/// Ready-to-use extractor backed by the system `tesseract` binary.
///
/// For a different engine (or a scripted one in tests), build a
/// [`Pipeline`] with any [`Recognizer`] via [`CutlistOcr::with_engine`].
pub struct CutlistOcr {
    pipeline: Pipeline,
}

impl CutlistOcr {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_engine(Box::new(TesseractEngine::new()), config)
    }

    pub fn with_engine(engine: Box<dyn Recognizer>, config: PipelineConfig) -> Self {
        Self {
            pipeline: Pipeline::new(engine, config),
        }
    }

    /// Analyzes an image file. Fails only when the file cannot be decoded.
    pub fn extract_pieces<P: AsRef<Path>>(&self, path: P) -> Result<AnalysisResult, AnalyzeError> {
        self.pipeline.analyze_path(path)
    }

    /// Analyzes encoded image data held in memory.
    pub fn extract_pieces_from_bytes(&self, bytes: &[u8]) -> Result<AnalysisResult, AnalyzeError> {
        self.pipeline.analyze_bytes(bytes)
    }

    /// Analyzes an already decoded image. Infallible; an empty piece list
    /// is a valid outcome.
    pub fn analyze_image(&self, image: &DynamicImage) -> AnalysisResult {
        self.pipeline.analyze_image(image)
    }
}

impl Default for CutlistOcr {
    fn default() -> Self {
        Self::new()
    }
}
