// ============================================================================
// SAMPLING - clamp-to-edge bilinear texture fetches for the CPU pass
// ============================================================================

use image::RgbaImage;

/// Clamp-sample a texel as normalized RGBA.
#[inline]
fn texel(img: &RgbaImage, x: i32, y: i32) -> [f32; 4] {
    let cx = x.clamp(0, img.width() as i32 - 1) as u32;
    let cy = y.clamp(0, img.height() as i32 - 1) as u32;
    let p = img.get_pixel(cx, cy);
    [
        p[0] as f32 / 255.0,
        p[1] as f32 / 255.0,
        p[2] as f32 / 255.0,
        p[3] as f32 / 255.0,
    ]
}

/// Bilinear-sample at fractional texel coordinates (texel centres at integers).
#[inline]
pub fn sample_bilinear(img: &RgbaImage, fx: f32, fy: f32) -> [f32; 4] {
    let x0 = fx.floor() as i32;
    let y0 = fy.floor() as i32;
    let dx = fx - x0 as f32;
    let dy = fy - y0 as f32;

    let p00 = texel(img, x0, y0);
    let p10 = texel(img, x0 + 1, y0);
    let p01 = texel(img, x0, y0 + 1);
    let p11 = texel(img, x0 + 1, y0 + 1);

    let mut out = [0.0f32; 4];
    for c in 0..4 {
        out[c] = p00[c] * (1.0 - dx) * (1.0 - dy)
            + p10[c] * dx * (1.0 - dy)
            + p01[c] * (1.0 - dx) * dy
            + p11[c] * dx * dy;
    }
    out
}

/// Sample with normalized texture coordinates, matching a linear,
/// clamp-to-edge GPU sampler: `uv * size - 0.5` in texel space.
#[inline]
pub fn sample_uv(img: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    sample_bilinear(
        img,
        u * img.width() as f32 - 0.5,
        v * img.height() as f32 - 0.5,
    )
}
