use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::types::{AnalysisResult, Region};

const BOX_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const LABEL_COLOR: Rgb<u8> = Rgb([235, 200, 0]);

/// Styling for the human-review overlay.
pub struct OverlayConfig {
    /// Font used for text labels. With `None`, labels are skipped and only
    /// rectangles are drawn.
    pub font: Option<FontVec>,
    pub font_scale: f32,
    pub box_thickness: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
            box_thickness: 2,
        }
    }
}

impl OverlayConfig {
    /// Loads the label font from raw TTF/OTF bytes.
    pub fn with_font_bytes(bytes: Vec<u8>) -> Option<Self> {
        let font = FontVec::try_from_vec(bytes).ok()?;
        Some(Self {
            font: Some(font),
            ..Self::default()
        })
    }
}

/// Paints detected regions and recognized text onto a copy of the photo.
///
/// Persisting the overlay is the caller's business; the library never
/// writes to a fixed path on its own.
pub fn draw_overlay(image: &DynamicImage, result: &AnalysisResult, cfg: &OverlayConfig) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for region in &result.regions {
        draw_box(&mut canvas, region, cfg.box_thickness);
    }

    if let Some(font) = &cfg.font {
        let scale = PxScale::from(cfg.font_scale);
        for piece in &result.pieces {
            let Some(region) = &piece.region else { continue };
            let x = region.x.saturating_add(4) as i32;
            let y = region.y.saturating_add(2) as i32;
            draw_text_mut(&mut canvas, LABEL_COLOR, x, y, scale, font, &piece.source_text);
        }
    }

    canvas
}

fn draw_box(canvas: &mut RgbImage, region: &Region, thickness: u32) {
    for t in 0..thickness.max(1) {
        let rect = Rect::at(region.x as i32 + t as i32, region.y as i32 + t as i32).of_size(
            region.width.saturating_sub(2 * t).max(1),
            region.height.saturating_sub(2 * t).max(1),
        );
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeFlags, Piece};
    use image::{GrayImage, Luma};

    fn result_with_one_region() -> AnalysisResult {
        AnalysisResult {
            pieces: vec![Piece {
                quantity: 1,
                length: 700,
                width: 400,
                edges: EdgeFlags::default(),
                source_text: "700x400".into(),
                region: Some(Region::new(20, 30, 100, 40)),
            }],
            regions: vec![Region::new(20, 30, 100, 40)],
            image_width: 200,
            image_height: 120,
        }
    }

    #[test]
    fn region_border_is_painted() {
        let photo = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 120, Luma([255])));
        let overlay = draw_overlay(&photo, &result_with_one_region(), &OverlayConfig::default());
        assert_eq!(*overlay.get_pixel(20, 30), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(119, 30), BOX_COLOR);
        // Interior stays untouched.
        assert_eq!(*overlay.get_pixel(70, 50), Rgb([255, 255, 255]));
    }

    #[test]
    fn missing_font_skips_labels_without_panicking() {
        let photo = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 120, Luma([255])));
        let overlay = draw_overlay(&photo, &result_with_one_region(), &OverlayConfig::default());
        assert_eq!(overlay.dimensions(), (200, 120));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        assert!(OverlayConfig::with_font_bytes(vec![0, 1, 2, 3]).is_none());
    }
}
