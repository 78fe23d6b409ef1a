use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Region::new(x, y, right - x, bottom - y)
    }

    /// Horizontal gap between the two boxes; zero when they overlap in x.
    pub fn gap_x(&self, other: &Region) -> u32 {
        if self.x > other.right() {
            self.x - other.right()
        } else if other.x > self.right() {
            other.x - self.right()
        } else {
            0
        }
    }

    /// Vertical gap between the two boxes; zero when they overlap in y.
    pub fn gap_y(&self, other: &Region) -> u32 {
        if self.y > other.bottom() {
            self.y - other.bottom()
        } else if other.y > self.bottom() {
            other.y - self.bottom()
        } else {
            0
        }
    }

    /// Scales the region by `factor` and clamps it to `max_width` x `max_height`.
    ///
    /// Used to map regions detected on a downscaled working image back to
    /// the resolution of the original photo.
    pub fn scale_clamped(&self, factor: f32, max_width: u32, max_height: u32) -> Region {
        let x = ((self.x as f32 * factor).round() as u32).min(max_width.saturating_sub(1));
        let y = ((self.y as f32 * factor).round() as u32).min(max_height.saturating_sub(1));
        let width = ((self.width as f32 * factor).round() as u32).max(1);
        let height = ((self.height as f32 * factor).round() as u32).max(1);
        Region::new(x, y, width.min(max_width - x), height.min(max_height - y))
    }

    pub fn contained_in(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Edge-banding flags for the four sides of a piece (two lengths, two widths).
///
/// The extraction pipeline never sets these; they exist so downstream
/// editors can toggle banding per side before rendering a report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFlags {
    #[serde(rename = "L1")]
    pub l1: bool,
    #[serde(rename = "L2")]
    pub l2: bool,
    #[serde(rename = "A1")]
    pub a1: bool,
    #[serde(rename = "A2")]
    pub a2: bool,
}

/// One extracted cut-list entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub quantity: u32,
    /// Length in millimeters.
    pub length: u32,
    /// Width in millimeters.
    pub width: u32,
    pub edges: EdgeFlags,
    /// The raw text fragment the measurement was parsed from.
    pub source_text: String,
    /// Source location in original-image coordinates. Pieces recovered by
    /// the whole-image fallback carry the full image bounds.
    pub region: Option<Region>,
}

/// Result of analyzing one photograph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub pieces: Vec<Piece>,
    /// All detected text regions in original-image coordinates, whether or
    /// not they yielded pieces. Meant for review overlays.
    pub regions: Vec<Region>,
    pub image_width: u32,
    pub image_height: u32,
}

/// Settings for the rectification stage (downscale, contrast, denoise, deskew).
#[derive(Clone, Debug)]
pub struct RectifyConfig {
    /// Longest image side is clamped to this many pixels before recognition.
    pub max_side: u32,
    /// Tile grid size for local contrast equalization.
    pub contrast_tiles: u32,
    /// Histogram clip limit per tile, as a multiple of the uniform bin height.
    pub contrast_clip_limit: f32,
    /// Radius of the edge-preserving median filter (1 = 3x3 window).
    pub median_radius: u32,
    /// Skew angles below this many degrees are left uncorrected.
    pub deskew_deadzone_deg: f32,
    /// Minimum number of ink pixels required to attempt skew estimation.
    pub min_ink_pixels: usize,
    /// Upper bound on ink pixels sampled for the min-area rectangle.
    pub max_skew_samples: usize,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            max_side: 1400,
            contrast_tiles: 8,
            contrast_clip_limit: 3.0,
            median_radius: 1,
            deskew_deadzone_deg: 1.0,
            min_ink_pixels: 64,
            max_skew_samples: 40_000,
        }
    }
}

/// Settings for the text region detector.
#[derive(Clone, Debug)]
pub struct DetectConfig {
    /// Radius of the local-mean window used for adaptive binarization.
    pub block_radius: u32,
    /// Offset subtracted from the local mean before thresholding.
    pub threshold_offset: i32,
    /// Width of the horizontal closing kernel that bridges character gaps.
    pub close_width: u32,
    /// Height of the closing kernel; kept small so separate lines stay apart.
    pub close_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub min_area: u64,
    /// Boxes wider than this fraction of the image are treated as rules, not text.
    pub max_width_frac: f32,
    /// Boxes closer than this horizontally are merged into one region.
    pub merge_gap_x: u32,
    /// Boxes closer than this vertically are merged into one region.
    pub merge_gap_y: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            block_radius: 15,
            threshold_offset: 7,
            close_width: 15,
            close_height: 3,
            min_width: 40,
            min_height: 12,
            min_area: 2000,
            max_width_frac: 0.98,
            merge_gap_x: 24,
            merge_gap_y: 10,
        }
    }
}

/// Settings for cropping and the per-region recognition attempts.
#[derive(Clone, Debug)]
pub struct RecognitionConfig {
    /// Horizontal crop padding as a fraction of the region width.
    pub pad_frac_x: f32,
    /// Vertical crop padding as a fraction of the region height.
    pub pad_frac_y: f32,
    /// Fixed padding added on top of the fractional padding.
    pub pad_px: u32,
    /// Crops shorter than this are upscaled before recognition.
    pub min_crop_height: u32,
    /// Upscale factor applied to small crops.
    pub upscale: u32,
    /// Timeout for one recognition attempt over one region.
    pub line_timeout: Duration,
    /// Timeout for the whole-image fallback pass.
    pub global_timeout: Duration,
    /// Expansion of the retry strip, as a fraction of the region height
    /// added above and below.
    pub strip_expand_frac: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            pad_frac_x: 0.03,
            pad_frac_y: 0.15,
            pad_px: 2,
            min_crop_height: 60,
            upscale: 2,
            line_timeout: Duration::from_secs(12),
            global_timeout: Duration::from_secs(30),
            strip_expand_frac: 0.8,
        }
    }
}

/// Plausibility bounds applied to parsed measurements.
///
/// Dimensions are millimeters; anything outside the window is assumed to be
/// an OCR misread and dropped.
#[derive(Clone, Debug)]
pub struct ParseConfig {
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub max_quantity: u32,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            min_dimension: 30,
            max_dimension: 4000,
            max_quantity: 99,
        }
    }
}

/// Aggregated settings for the full extraction pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub rectify: RectifyConfig,
    pub detect: DetectConfig,
    pub recognition: RecognitionConfig,
    pub parse: ParseConfig,
    /// Language hint passed to the recognition engine.
    pub language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rectify: RectifyConfig::default(),
            detect: DetectConfig::default(),
            recognition: RecognitionConfig::default(),
            parse: ParseConfig::default(),
            language: "eng+spa".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_covers_both_boxes() {
        let a = Region::new(10, 10, 20, 10);
        let b = Region::new(40, 15, 10, 10);
        assert_eq!(a.union(&b), Region::new(10, 10, 40, 15));
    }

    #[test]
    fn gaps_are_zero_for_overlapping_boxes() {
        let a = Region::new(0, 0, 30, 30);
        let b = Region::new(20, 20, 30, 30);
        assert_eq!(a.gap_x(&b), 0);
        assert_eq!(a.gap_y(&b), 0);
    }

    #[test]
    fn gap_is_measured_between_edges() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(25, 0, 10, 10);
        assert_eq!(a.gap_x(&b), 15);
        assert_eq!(b.gap_x(&a), 15);
    }

    #[test]
    fn scale_clamped_stays_inside_bounds() {
        let r = Region::new(600, 400, 200, 100);
        let mapped = r.scale_clamped(2.0, 2500, 900);
        assert!(mapped.contained_in(2500, 900));
        assert_eq!(mapped.x, 1200);
        assert_eq!(mapped.height, 100); // clamped by the 900 px bound
    }
}
