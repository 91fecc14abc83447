// ============================================================================
// HALD LUT - 3D colour transform packed into an N×N grid of N×N tiles
// ============================================================================
//
// Layout: blue slice `s` lives in tile `(s mod N, floor(s / N))`; inside a
// tile the texel `(r·(N-1), g·(N-1))` holds the output colour. The whole
// texture is N²×N² pixels. Two blue slices are fetched (bilinear in r/g)
// and blended by the blue fraction.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use super::sampling::sample_uv;

/// Grid sizes the loader accepts.
pub const SUPPORTED_HALD_SIZES: [u32; 2] = [8, 16];

/// A loaded (or neutral) lookup table, shared read-only between cards.
#[derive(Clone)]
pub struct HaldLut {
    texture: Arc<RgbaImage>,
    /// Effective grid size. `0` disables grading.
    size: u32,
}

impl HaldLut {
    /// Wrap a decoded LUT image. Fails when the texture is not N²×N² or
    /// N is not a supported grid size.
    pub fn new(texture: RgbaImage, size: u32) -> Result<Self, String> {
        if !SUPPORTED_HALD_SIZES.contains(&size) {
            return Err(format!("unsupported HALD size {size} (expected 8 or 16)"));
        }
        let side = size * size;
        if texture.width() != side || texture.height() != side {
            return Err(format!(
                "LUT is {}×{} but HALD size {size} needs {side}×{side}",
                texture.width(),
                texture.height()
            ));
        }
        Ok(Self {
            texture: Arc::new(texture),
            size,
        })
    }

    /// 1×1 neutral texture with effective size 0 - grading is skipped.
    pub fn neutral() -> Self {
        Self {
            texture: Arc::new(RgbaImage::from_pixel(1, 1, Rgba([128, 128, 128, 255]))),
            size: 0,
        }
    }

    /// Effective grid size (0 when neutral).
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_neutral(&self) -> bool {
        self.size <= 1
    }

    pub fn texture(&self) -> &RgbaImage {
        &self.texture
    }
}

/// Two-slice HALD lookup against `hald` with grid size `n`.
pub fn apply_hald_lut(hald: &RgbaImage, n: f32, rgb: [f32; 3]) -> [f32; 3] {
    if n <= 1.0 {
        return rgb;
    }
    let n1 = n - 1.0;
    let blue = rgb[2] * n1;
    let s0 = blue.floor();
    let s1 = n1.min(s0 + 1.0);
    let f = blue - s0;

    let r = rgb[0] * n1;
    let g = rgb[1] * n1;
    let area = n * n;

    let slice_uv = |s: f32| {
        let tx = s - n * (s / n).floor();
        let ty = (s / n).floor();
        ((r + tx * n + 0.5) / area, (g + ty * n + 0.5) / area)
    };

    let (u0, v0) = slice_uv(s0);
    let (u1, v1) = slice_uv(s1);
    let c0 = sample_uv(hald, u0, v0);
    let c1 = sample_uv(hald, u1, v1);

    [
        c0[0] * (1.0 - f) + c1[0] * f,
        c0[1] * (1.0 - f) + c1[1] * f,
        c0[2] * (1.0 - f) + c1[2] * f,
    ]
}

/// Build a LUT texture from an arbitrary colour transform evaluated at
/// every lattice point. Tiles past the last blue slice repeat the top slice.
/// Sizes below 2 have no lattice spacing and build the 2-grid instead.
pub fn build_hald_texture<F>(size: u32, transform: F) -> RgbaImage
where
    F: Fn([f32; 3]) -> [f32; 3],
{
    let size = size.max(2);
    let n1 = (size - 1) as f32;
    RgbaImage::from_fn(size * size, size * size, |x, y| {
        let tile = (y / size) * size + x / size;
        let slice = tile.min(size - 1);
        let input = [
            (x % size) as f32 / n1,
            (y % size) as f32 / n1,
            slice as f32 / n1,
        ];
        let out = transform(input);
        Rgba([
            (out[0].clamp(0.0, 1.0) * 255.0).round() as u8,
            (out[1].clamp(0.0, 1.0) * 255.0).round() as u8,
            (out[2].clamp(0.0, 1.0) * 255.0).round() as u8,
            255,
        ])
    })
}

/// Identity HALD texture: every lattice point maps to itself.
pub fn identity_hald(size: u32) -> RgbaImage {
    build_hald_texture(size, |c| c)
}

/// Rec. 709 luma desaturation.
pub fn desaturate_hald(size: u32) -> RgbaImage {
    build_hald_texture(size, |c| {
        let y = 0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2];
        [y, y, y]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mis_sized_textures() {
        assert!(HaldLut::new(RgbaImage::new(64, 64), 16).is_err());
        assert!(HaldLut::new(RgbaImage::new(256, 256), 12).is_err());
        assert!(HaldLut::new(identity_hald(8), 8).is_ok());
    }

    #[test]
    fn tiny_grid_sizes_build_the_smallest_table() {
        for size in [0, 1] {
            let tex = identity_hald(size);
            assert_eq!(tex.dimensions(), (4, 4));
            let out = apply_hald_lut(&tex, 2.0, [1.0, 0.0, 1.0]);
            assert!(out.iter().all(|v| v.is_finite()));
            assert!((out[0] - 1.0).abs() < 1e-6 && out[1].abs() < 1e-6);
        }
    }

    #[test]
    fn neutral_lut_is_passthrough() {
        let lut = HaldLut::neutral();
        assert_eq!(lut.size(), 0);
        let c = [0.2, 0.4, 0.9];
        assert_eq!(apply_hald_lut(lut.texture(), lut.size() as f32, c), c);
    }

    #[test]
    fn identity_lut_round_trips_colours() {
        for size in SUPPORTED_HALD_SIZES {
            let lut = HaldLut::new(identity_hald(size), size).unwrap();
            for &c in &[
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0],
                [0.13, 0.57, 0.91],
                [0.5, 0.25, 0.75],
                [0.99, 0.01, 0.42],
            ] {
                let out = apply_hald_lut(lut.texture(), lut.size() as f32, c);
                for k in 0..3 {
                    assert!(
                        (out[k] - c[k]).abs() < 2.0 / 255.0,
                        "size {size}: {c:?} -> {out:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn desaturation_lut_greys_pure_red() {
        let lut = HaldLut::new(desaturate_hald(16), 16).unwrap();
        let out = apply_hald_lut(lut.texture(), lut.size() as f32, [1.0, 0.0, 0.0]);
        let expected = (0.2126f32 * 255.0).round() / 255.0;
        for k in 0..3 {
            assert!((out[k] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn top_blue_slice_does_not_overflow() {
        let lut = HaldLut::new(identity_hald(16), 16).unwrap();
        let out = apply_hald_lut(lut.texture(), lut.size() as f32, [0.3, 0.3, 1.0]);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }
}
