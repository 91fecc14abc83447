// ============================================================================
// CANVAS - render surface and the rayon-parallel CPU shading pass
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::shading::{ShadeParams, shade_pixel};

/// Device pixel ratios above this are clamped (keeps surfaces bounded).
pub const MAX_PIXEL_RATIO: f32 = 2.0;

/// Output pixel grid of one card, sized to CSS size × device pixel ratio.
/// Recreated (never resized in place) whenever the display size changes.
pub struct RenderSurface {
    pub pixels: RgbaImage,
    pub css_width: f32,
    pub css_height: f32,
    pub pixel_ratio: f32,
    /// Bumped on every recreation so stale frames can be detected.
    pub generation: u64,
}

impl RenderSurface {
    pub fn new(css_width: f32, css_height: f32, pixel_ratio: f32, generation: u64) -> Self {
        let (w, h) = surface_size(css_width, css_height, pixel_ratio);
        Self {
            pixels: RgbaImage::new(w, h),
            css_width,
            css_height,
            pixel_ratio: clamp_pixel_ratio(pixel_ratio),
            generation,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// True when a request for this display size needs a new surface.
    pub fn needs_recreate(&self, css_width: f32, css_height: f32, pixel_ratio: f32) -> bool {
        surface_size(css_width, css_height, pixel_ratio) != (self.width(), self.height())
    }
}

/// Clamp a reported device pixel ratio into `(0, MAX_PIXEL_RATIO]`.
pub fn clamp_pixel_ratio(ratio: f32) -> f32 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 1.0;
    }
    ratio.min(MAX_PIXEL_RATIO)
}

/// Physical pixel size for a CSS size at a pixel ratio (at least 1×1).
pub fn surface_size(css_width: f32, css_height: f32, pixel_ratio: f32) -> (u32, u32) {
    let r = clamp_pixel_ratio(pixel_ratio);
    let w = (css_width * r).round().max(1.0) as u32;
    let h = (css_height * r).round().max(1.0) as u32;
    (w, h)
}

#[inline]
fn to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// One full shading pass into `out`. Rows run in parallel; each pixel is
/// shaded at its centre.
pub fn render_cpu(photo: &RgbaImage, lut: &RgbaImage, params: &ShadeParams, out: &mut RgbaImage) {
    let w = out.width() as usize;
    let h = out.height() as usize;
    if w == 0 || h == 0 {
        return;
    }
    let stride = w * 4;
    let inv_w = 1.0 / w as f32;
    let inv_h = 1.0 / h as f32;

    out.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let v = (y as f32 + 0.5) * inv_h;
            for x in 0..w {
                let u = (x as f32 + 0.5) * inv_w;
                let px = shade_pixel(photo, lut, params, u, v);
                let pi = x * 4;
                row[pi] = to_u8(px[0]);
                row[pi + 1] = to_u8(px[1]);
                row[pi + 2] = to_u8(px[2]);
                row[pi + 3] = to_u8(px[3]);
            }
        });
}
