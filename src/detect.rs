use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use tracing::debug;

use crate::types::{DetectConfig, Region};

/// Locates rectangular regions likely to contain one line or cell of
/// measurement text.
///
/// Deterministic; output is sorted top-to-bottom, then left-to-right.
/// An empty result is valid and routes the caller to the whole-image
/// fallback pass.
pub fn detect(image: &GrayImage, cfg: &DetectConfig) -> Vec<Region> {
    let (w, _) = image.dimensions();
    let ink = binarize_ink(image, cfg.block_radius, cfg.threshold_offset);
    let closed = close_rect(&ink, cfg.close_width, cfg.close_height);

    let max_width = (w as f32 * cfg.max_width_frac) as u32;
    let mut boxes: Vec<Region> = find_contours::<u32>(&closed)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .filter_map(|c| bounding_box(&c.points))
        .filter(|r| {
            r.height >= cfg.min_height
                && r.width >= cfg.min_width
                && r.area() >= cfg.min_area
                // Boxes spanning nearly the whole width are ruled lines or
                // table borders, not measurement text.
                && r.width < max_width
        })
        .collect();

    merge_nearby(&mut boxes, cfg.merge_gap_x, cfg.merge_gap_y);
    boxes.sort_by_key(|r| (r.y, r.x));
    debug!(count = boxes.len(), "text regions detected");
    boxes
}

/// Local-mean adaptive threshold, inverted so ink is foreground (255).
///
/// A pixel is ink when it is darker than the mean of its neighborhood by
/// more than `offset`. The mean comes from an integral image, so the cost
/// is independent of the window radius.
fn binarize_ink(image: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (w, h) = image.dimensions();
    let integral = integral_image(image);
    let sum = |x0: u32, y0: u32, x1: u32, y1: u32| -> u64 {
        // Inclusive box sum over the (w + 1) x (h + 1) integral grid.
        let idx = |x: u32, y: u32| (y as usize) * (w as usize + 1) + x as usize;
        integral[idx(x1 + 1, y1 + 1)] + integral[idx(x0, y0)]
            - integral[idx(x1 + 1, y0)]
            - integral[idx(x0, y1 + 1)]
    };

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let y0 = y.saturating_sub(block_radius);
        let y1 = (y + block_radius).min(h - 1);
        for x in 0..w {
            let x0 = x.saturating_sub(block_radius);
            let x1 = (x + block_radius).min(w - 1);
            let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as u64;
            let mean = (sum(x0, y0, x1, y1) / count) as i32;
            let ink = (image.get_pixel(x, y)[0] as i32) < mean - offset;
            out.put_pixel(x, y, Luma([if ink { 255 } else { 0 }]));
        }
    }
    out
}

fn integral_image(image: &GrayImage) -> Vec<u64> {
    let (w, h) = image.dimensions();
    let stride = w as usize + 1;
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += image.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
    integral
}

/// Morphological closing with a `width` x `height` rectangular kernel.
///
/// imageproc's norm-based structuring elements cannot express the wide,
/// flat kernel needed to bridge gaps between characters without also
/// merging adjacent lines, so the dilation/erosion pair runs as separable
/// 1-D max/min filters.
fn close_rect(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let rx = width / 2;
    let ry = height / 2;
    let dilated = filter_rows(&filter_cols(image, ry, u8::max), rx, u8::max);
    filter_rows(&filter_cols(&dilated, ry, u8::min), rx, u8::min)
}

fn filter_rows(image: &GrayImage, radius: u32, fold: fn(u8, u8) -> u8) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(w - 1);
            let mut acc = image.get_pixel(x0, y)[0];
            for xi in x0 + 1..=x1 {
                acc = fold(acc, image.get_pixel(xi, y)[0]);
            }
            out.put_pixel(x, y, Luma([acc]));
        }
    }
    out
}

fn filter_cols(image: &GrayImage, radius: u32, fold: fn(u8, u8) -> u8) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    for x in 0..w {
        for y in 0..h {
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius).min(h - 1);
            let mut acc = image.get_pixel(x, y0)[0];
            for yi in y0 + 1..=y1 {
                acc = fold(acc, image.get_pixel(x, yi)[0]);
            }
            out.put_pixel(x, y, Luma([acc]));
        }
    }
    out
}

fn bounding_box(points: &[Point<u32>]) -> Option<Region> {
    let first = points.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Some(Region::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Repeatedly merges boxes that are vertically close and horizontally
/// overlapping or nearly adjacent, until no pair qualifies. Captures
/// multi-line cells and wrapped text as one region.
fn merge_nearby(boxes: &mut Vec<Region>, gap_x: u32, gap_y: u32) {
    loop {
        let mut merged_any = false;
        'scan: for i in 0..boxes.len() {
            for j in i + 1..boxes.len() {
                if boxes[i].gap_y(&boxes[j]) <= gap_y && boxes[i].gap_x(&boxes[j]) <= gap_x {
                    boxes[i] = boxes[i].union(&boxes[j]);
                    boxes.swap_remove(j);
                    merged_any = true;
                    break 'scan;
                }
            }
        }
        if !merged_any {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    fn fill(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
        for yy in y..y + h {
            for xx in x..x + w {
                img.put_pixel(xx, yy, Luma([0]));
            }
        }
    }

    #[test]
    fn blank_image_yields_no_regions() {
        let img = canvas(400, 300);
        assert!(detect(&img, &DetectConfig::default()).is_empty());
    }

    #[test]
    fn two_separated_lines_come_back_in_reading_order() {
        let mut img = canvas(400, 300);
        fill(&mut img, 50, 200, 200, 16);
        fill(&mut img, 40, 60, 220, 16);
        let regions = detect(&img, &DetectConfig::default());
        assert_eq!(regions.len(), 2);
        assert!(regions[0].y < regions[1].y);
        // Each detected region covers its drawn bar.
        assert!(regions[0].x <= 40 && regions[0].right() >= 260);
        assert!(regions[1].x <= 50 && regions[1].right() >= 250);
    }

    #[test]
    fn near_full_width_rule_is_rejected() {
        let mut img = canvas(400, 200);
        fill(&mut img, 2, 90, 396, 14);
        assert!(detect(&img, &DetectConfig::default()).is_empty());
    }

    #[test]
    fn vertically_close_rows_merge_into_one_region() {
        let mut img = canvas(400, 200);
        fill(&mut img, 60, 60, 200, 16);
        fill(&mut img, 70, 82, 180, 16); // 6 px gap, within merge_gap_y
        let regions = detect(&img, &DetectConfig::default());
        assert_eq!(regions.len(), 1);
        assert!(regions[0].height >= 38);
    }

    #[test]
    fn merge_is_transitive_across_passes() {
        let mut boxes = vec![
            Region::new(0, 0, 50, 10),
            Region::new(0, 40, 50, 10),
            Region::new(0, 20, 50, 10),
        ];
        merge_nearby(&mut boxes, 24, 10);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], Region::new(0, 0, 50, 50));
    }

    #[test]
    fn closing_bridges_character_gaps() {
        let mut img = canvas(200, 60);
        // Two "characters" 8 px apart; the 15-wide kernel bridges them.
        fill(&mut img, 40, 20, 20, 20);
        fill(&mut img, 68, 20, 20, 20);
        let ink = binarize_ink(&img, 15, 7);
        let closed = close_rect(&ink, 15, 3);
        assert_eq!(closed.get_pixel(64, 30)[0], 255);
    }
}
