//! Grayscale template search.
//!
//! Similarity is `1 - mean absolute difference / 255` over the template area.
//! Every placement is scored on a sparse grid of template pixels; the best
//! few placements are then scored on every pixel and the best one wins.

use image::GrayImage;

use super::driver::Rect;

/// Placements kept from the sparse pass for full scoring.
const CANDIDATES: usize = 16;

/// Locate `needle` inside `haystack`. Returns the best match scoring at least `confidence`.
pub fn locate(haystack: &GrayImage, needle: &GrayImage, confidence: f32) -> Option<Rect> {
    let (hw, hh) = haystack.dimensions();
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }
    let step = (nw.min(nh) / 4).max(1);

    // Sorted ascending by sparse score.
    let mut candidates: Vec<(u64, u32, u32)> = Vec::with_capacity(CANDIDATES + 1);
    for y in 0..=hh - nh {
        for x in 0..=hw - nw {
            let limit = if candidates.len() < CANDIDATES {
                u64::MAX
            } else {
                candidates[CANDIDATES - 1].0
            };
            let s = sad(haystack, needle, x, y, step, limit);
            if s < limit {
                let at = candidates.partition_point(|c| c.0 <= s);
                candidates.insert(at, (s, x, y));
                candidates.truncate(CANDIDATES);
            }
        }
    }

    let mut best: Option<(u64, u32, u32)> = None;
    for &(_, x, y) in &candidates {
        let limit = best.map_or(u64::MAX, |(s, _, _)| s);
        let s = sad(haystack, needle, x, y, 1, limit);
        if s < limit {
            best = Some((s, x, y));
        }
    }
    let (s, x, y) = best?;

    let score = 1.0 - s as f64 / (255.0 * f64::from(nw) * f64::from(nh));
    if score + f64::EPSILON < f64::from(confidence) {
        return None;
    }
    Some(Rect {
        x: x as i32,
        y: y as i32,
        width: nw,
        height: nh,
    })
}

/// Sum of absolute differences of sampled pixels, abandoned once it exceeds `limit`.
fn sad(haystack: &GrayImage, needle: &GrayImage, ox: u32, oy: u32, step: u32, limit: u64) -> u64 {
    let (nw, nh) = needle.dimensions();
    let mut total = 0u64;
    for y in (0..nh).step_by(step as usize) {
        for x in (0..nw).step_by(step as usize) {
            let a = haystack.get_pixel(ox + x, oy + y).0[0];
            let b = needle.get_pixel(x, y).0[0];
            total += u64::from(a.abs_diff(b));
        }
        if total > limit {
            break;
        }
    }
    total
}
