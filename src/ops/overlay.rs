// ============================================================================
// OVERLAY - lay the decorative frame over the shaded surface
// ============================================================================
//
// The shader leaves everything outside the photo window at alpha 0. The card
// is finished by plain source-over compositing, bottom to top: paper, shaded
// surface, then the frame image (scaled to the surface) when there is one.

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

/// Paper colour under the whole card.
pub const PAPER_COLOR: [u8; 4] = [0xF7, 0xF7, 0xF5, 0xFF];

/// Source-over of one straight-alpha pixel onto another.
#[inline]
fn over(src: &[u8], dst: &[u8]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src[c] as f32 / 255.0;
        let d = dst[c] as f32 / 255.0;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Composite `top` over `bottom` in place (same dimensions).
pub fn composite_over(bottom: &mut RgbaImage, top: &RgbaImage) {
    debug_assert_eq!(bottom.dimensions(), top.dimensions());
    let stride = bottom.width() as usize * 4;
    let top_raw = top.as_raw();
    bottom
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &top_raw[y * stride..(y + 1) * stride];
            for (dst, src) in row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                if src[3] == 0 {
                    continue;
                }
                let px = over(src, dst);
                dst.copy_from_slice(&px);
            }
        });
}

/// Scale a frame image to the surface size (triangle filter).
pub fn fit_frame(frame: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, imageops::FilterType::Triangle)
}

/// Build the finished card from the shaded surface.
/// `frame` must already match the surface size (see [`fit_frame`]).
pub fn compose_card(surface: &RgbaImage, frame: Option<&RgbaImage>, paper: [u8; 4]) -> RgbaImage {
    let mut out = RgbaImage::from_pixel(surface.width(), surface.height(), Rgba(paper));
    composite_over(&mut out, surface);
    if let Some(frame) = frame {
        composite_over(&mut out, frame);
    }
    out
}
