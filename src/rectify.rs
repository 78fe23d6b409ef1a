use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::debug;

use crate::types::RectifyConfig;

/// A cleaned-up working image plus the scale that maps it back to the
/// original photo (`working = original * scale`).
pub struct Rectified {
    pub image: GrayImage,
    pub scale: f32,
}

/// Prepares a photo for recognition: bounds its size, normalizes local
/// contrast, removes speckle noise and corrects skew.
///
/// Never fails; degenerate inputs (blank or near-blank images) skip the
/// skew correction and pass through otherwise untouched.
pub fn rectify(image: &GrayImage, cfg: &RectifyConfig) -> Rectified {
    let (scaled, scale) = limit_max_side(image, cfg.max_side);
    let contrasted = equalize_local_contrast(&scaled, cfg.contrast_tiles, cfg.contrast_clip_limit);
    let denoised = median_filter(&contrasted, cfg.median_radius, cfg.median_radius);
    let image = deskew(&denoised, cfg);
    Rectified { image, scale }
}

/// Downscales so the longer side is at most `max_side`, preserving aspect
/// ratio. Returns the applied scale factor (1.0 when untouched).
fn limit_max_side(image: &GrayImage, max_side: u32) -> (GrayImage, f32) {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_side || longest == 0 {
        return (image.clone(), 1.0);
    }
    let scale = max_side as f32 / longest as f32;
    let nw = ((w as f32 * scale) as u32).max(1);
    let nh = ((h as f32 * scale) as u32).max(1);
    debug!(from_w = w, from_h = h, to_w = nw, to_h = nh, "downscaling for recognition");
    (imageops::resize(image, nw, nh, FilterType::Triangle), scale)
}

/// Tile-based adaptive histogram equalization with clipping.
///
/// Each tile of an `tiles` x `tiles` grid gets its own clipped-histogram
/// intensity mapping; per-pixel output blends the four surrounding tile
/// mappings bilinearly so tile seams stay invisible.
fn equalize_local_contrast(image: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    let tiles = tiles.max(1);
    if w < tiles || h < tiles {
        return image.clone();
    }

    let tile_w = w.div_ceil(tiles);
    let tile_h = h.div_ceil(tiles);
    let grid_x = w.div_ceil(tile_w);
    let grid_y = h.div_ceil(tile_h);

    // One 256-entry lookup table per tile.
    let mut luts = vec![[0u8; 256]; (grid_x * grid_y) as usize];
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let total = (x1 - x0) * (y1 - y0);
            let limit = ((clip_limit * total as f32 / 256.0).ceil() as u32).max(1);

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            let lut = &mut luts[(ty * grid_x + tx) as usize];
            let mut cdf = 0u64;
            for (v, bin) in hist.iter().enumerate() {
                cdf += (*bin + bonus) as u64;
                lut[v] = ((cdf * 255) / total.max(1) as u64).min(255) as u8;
            }
        }
    }

    // Neighbor tile pair and blend weight for one axis, clamped at the
    // borders so edge pixels use the outermost tile alone.
    let axis = |pos: u32, tile_len: u32, grid_len: u32| -> (u32, u32, f32) {
        let f = (pos as f32 - tile_len as f32 / 2.0) / tile_len as f32;
        if f < 0.0 {
            (0, 0, 0.0)
        } else {
            let t0 = (f.floor() as u32).min(grid_len - 1);
            let t1 = (t0 + 1).min(grid_len - 1);
            (t0, t1, f - f.floor())
        }
    };

    let lut_at = |tx: u32, ty: u32| &luts[(ty * grid_x + tx) as usize];
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, wy) = axis(y, tile_h, grid_y);
        for x in 0..w {
            let (tx0, tx1, wx) = axis(x, tile_w, grid_x);
            let v = image.get_pixel(x, y)[0] as usize;
            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty0)[v] as f32 * wx;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty1)[v] as f32 * wx;
            let blended = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Rotates the image upright when the estimated skew exceeds the dead-zone.
///
/// A fixed point for already-upright images: once the estimate falls inside
/// the dead-zone the input is returned unchanged.
pub fn deskew(image: &GrayImage, cfg: &RectifyConfig) -> GrayImage {
    match estimate_skew_degrees(image, cfg) {
        Some(angle) if angle.abs() > cfg.deskew_deadzone_deg => {
            debug!(angle, "correcting skew");
            rotate_about_center(image, -angle.to_radians(), Interpolation::Bilinear, Luma([255]))
        }
        _ => image.clone(),
    }
}

/// Estimates the dominant text-baseline angle in degrees from the
/// min-area bounding rectangle of thresholded ink pixels.
///
/// Returns `None` when there is not enough ink to form an estimate.
pub fn estimate_skew_degrees(image: &GrayImage, cfg: &RectifyConfig) -> Option<f32> {
    let (w, h) = image.dimensions();
    if w < 2 || h < 2 {
        return None;
    }
    let level = otsu_level(image);

    let dark_total = image.pixels().filter(|p| p[0] < level).count();
    if dark_total < cfg.min_ink_pixels {
        return None;
    }
    let stride = (dark_total / cfg.max_skew_samples.max(1)).max(1);

    let mut points = Vec::with_capacity(dark_total.min(cfg.max_skew_samples) + 1);
    let mut seen = 0usize;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (u32::MAX, 0u32, u32::MAX, 0u32);
    for (x, y, p) in image.enumerate_pixels() {
        if p[0] < level {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
            if seen % stride == 0 {
                points.push(Point::new(x as i32, y as i32));
            }
            seen += 1;
        }
    }
    // Collinear ink (a single ruled line) has no meaningful baseline angle.
    if max_x - min_x < 2 || max_y - min_y < 2 {
        return None;
    }

    let corners = min_area_rect(&points);
    Some(rect_angle_degrees(&corners))
}

/// Angle of the longer rectangle edge, normalized into [-45, 45].
fn rect_angle_degrees(corners: &[Point<i32>; 4]) -> f32 {
    let edge = |a: Point<i32>, b: Point<i32>| {
        let dx = (b.x - a.x) as f32;
        let dy = (b.y - a.y) as f32;
        (dx, dy, dx.hypot(dy))
    };
    let (dx1, dy1, len1) = edge(corners[0], corners[1]);
    let (dx2, dy2, len2) = edge(corners[1], corners[2]);
    let (dx, dy) = if len1 >= len2 { (dx1, dy1) } else { (dx2, dy2) };

    let mut angle = dy.atan2(dx).to_degrees();
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle < -45.0 {
        angle += 90.0;
    }
    angle
}
