// ============================================================================
// SHADING - the per-pixel polaroid recipe (CPU reference of POLAROID_SHADER)
// ============================================================================
//
// Stages, in order:
//   window test → re-normalise → base sample → HALD grade → vignette
//   → temporal grain → gloss coat (Blinn-Phong + streak + Fresnel + sparkle)
//
// Each stage is a separate function so tests can rebuild partial pipelines.
// Keep this file and gpu/shaders.rs in lock-step.

use image::RgbaImage;

use super::lut::apply_hald_lut;
use super::noise::{grain_sample, mix, smoothstep, sparkle_sample};
use super::sampling::sample_uv;
use crate::params::{EffectParameters, Inset};

/// Diagonal direction of the laminate's coating lines (unnormalized).
const STREAK_DIR: [f32; 2] = [0.92, 0.38];

/// Everything one frame of shading reads, besides the two textures.
/// This is the CPU twin of the GPU uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadeParams {
    pub effects: EffectParameters,
    pub light_pos: [f32; 2],
    pub inset: Inset,
    /// Effective HALD size; `<= 1` skips grading.
    pub hald_size: f32,
    pub time: f32,
}

impl ShadeParams {
    /// Photo-window rectangle as `(min, max)` in canvas uv.
    #[inline]
    pub fn window(&self) -> ([f32; 2], [f32; 2]) {
        (
            [self.inset.left, self.inset.top],
            [1.0 - self.inset.right, 1.0 - self.inset.bottom],
        )
    }
}

/// Map a canvas coordinate into photo space, or `None` outside the window.
#[inline]
pub fn window_uv(params: &ShadeParams, u: f32, v: f32) -> Option<[f32; 2]> {
    let (min_p, max_p) = params.window();
    if u < min_p[0] || u > max_p[0] || v < min_p[1] || v > max_p[1] {
        return None;
    }
    Some([
        (u - min_p[0]) / (max_p[0] - min_p[0]),
        (v - min_p[1]) / (max_p[1] - min_p[1]),
    ])
}

/// Blend the HALD-graded colour in by `lut_strength`.
#[inline]
pub fn grade(color: [f32; 3], lut: &RgbaImage, params: &ShadeParams) -> [f32; 3] {
    let strength = params.effects.lut_strength;
    if params.hald_size <= 1.0 || strength <= 0.0 {
        return color;
    }
    let graded = apply_hald_lut(lut, params.hald_size, color);
    [
        mix(color[0], graded[0], strength),
        mix(color[1], graded[1], strength),
        mix(color[2], graded[2], strength),
    ]
}

/// Gentle radial darkening, stretched 1.1× vertically.
#[inline]
pub fn vignette(color: [f32; 3], iuv: [f32; 2], amount: f32) -> [f32; 3] {
    let dx = iuv[0] - 0.5;
    let dy = (iuv[1] - 0.5) * 1.1;
    let r = (dx * dx + dy * dy).sqrt();
    let k = mix(1.0, 0.82, smoothstep(0.35, 0.85, r) * amount);
    [color[0] * k, color[1] * k, color[2] * k]
}

/// Temporal film grain, ±3 % per unit of `amount`.
#[inline]
pub fn grain(color: [f32; 3], iuv: [f32; 2], amount: f32, time: f32) -> [f32; 3] {
    if amount <= 0.0 {
        return color;
    }
    let g = grain_sample(iuv[0], iuv[1], time) * (0.06 * amount);
    [
        (color[0] + g).clamp(0.0, 1.0),
        (color[1] + g).clamp(0.0, 1.0),
        (color[2] + g).clamp(0.0, 1.0),
    ]
}

#[inline]
fn normalize3(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len == 0.0 {
        return [0.0; 3];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

#[inline]
fn dot3(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Scalar intensity of the clear laminate at `iuv` (before `gloss` scaling).
pub fn coat_intensity(iuv: [f32; 2], effects: &EffectParameters, light_pos: [f32; 2]) -> f32 {
    let view = [0.0, 0.0, 1.0];
    let light = normalize3([light_pos[0] - iuv[0], light_pos[1] - iuv[1], 0.75]);

    // Curved laminate: flat in the centre, tilting toward the edges.
    let px = iuv[0] - 0.5;
    let py = (iuv[1] - 0.5) * 1.2;
    let pr = (px * px + py * py).sqrt().clamp(0.0, 1.0);
    let roll = effects.roll;
    let normal = normalize3([px * roll, py * roll, 1.0 - pr * roll]);

    let half = normalize3([light[0] + view[0], light[1] + view[1], light[2] + view[2]]);
    let mut spec = dot3(normal, half).max(0.0).powf(effects.spec_power);

    let tl = (STREAK_DIR[0] * STREAK_DIR[0] + STREAK_DIR[1] * STREAK_DIR[1]).sqrt();
    let hl = (half[0] * half[0] + half[1] * half[1]).sqrt();
    let aniso = if hl > 0.0 {
        ((half[0] / hl) * (STREAK_DIR[0] / tl) + (half[1] / hl) * (STREAK_DIR[1] / tl))
            .abs()
            .powi(8)
    } else {
        0.0
    };
    spec *= mix(1.0, 1.0 + 2.0 * aniso, effects.streak);

    let edge = (1.0 - dot3(normal, view).max(0.0)).powf(2.2) * effects.fresnel;
    let sparkle = sparkle_sample(iuv[0], iuv[1]);

    spec * 0.95 + edge * 0.18 + sparkle
}

/// Add the gloss coat and clamp.
#[inline]
pub fn gloss_coat(color: [f32; 3], iuv: [f32; 2], params: &ShadeParams) -> [f32; 3] {
    let gloss = params.effects.gloss;
    if gloss == 0.0 {
        return color;
    }
    let coat = coat_intensity(iuv, &params.effects, params.light_pos) * gloss;
    [
        (color[0] + coat).clamp(0.0, 1.0),
        (color[1] + coat).clamp(0.0, 1.0),
        (color[2] + coat).clamp(0.0, 1.0),
    ]
}

/// Full recipe for one canvas coordinate. Returns straight RGBA in [0,1];
/// `[0; 4]` outside the photo window.
pub fn shade_pixel(
    photo: &RgbaImage,
    lut: &RgbaImage,
    params: &ShadeParams,
    u: f32,
    v: f32,
) -> [f32; 4] {
    let Some(iuv) = window_uv(params, u, v) else {
        return [0.0; 4];
    };

    let texel = sample_uv(photo, iuv[0], iuv[1]);
    let mut color = [texel[0], texel[1], texel[2]];

    color = grade(color, lut, params);
    color = vignette(color, iuv, params.effects.vignette);
    color = grain(color, iuv, params.effects.grain, params.time);
    color = gloss_coat(color, iuv, params);

    [color[0], color[1], color[2], 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::lut::{desaturate_hald, identity_hald};
    use image::Rgba;

    fn params() -> ShadeParams {
        ShadeParams {
            effects: EffectParameters::default(),
            light_pos: [0.55, 0.22],
            inset: Inset::uniform(0.1),
            hald_size: 16.0,
            time: 1.25,
        }
    }

    fn gradient_photo() -> RgbaImage {
        RgbaImage::from_fn(32, 24, |x, y| Rgba([(x * 8) as u8, (y * 10) as u8, 120, 255]))
    }

    #[test]
    fn outside_window_is_fully_transparent() {
        let photo = gradient_photo();
        let lut = identity_hald(16);
        let p = params();
        for &(u, v) in &[(0.05, 0.5), (0.95, 0.5), (0.5, 0.02), (0.5, 0.97)] {
            assert_eq!(shade_pixel(&photo, &lut, &p, u, v), [0.0; 4]);
        }
        assert_eq!(shade_pixel(&photo, &lut, &p, 0.5, 0.5)[3], 1.0);
    }

    #[test]
    fn window_uv_maps_corners() {
        let p = params();
        assert_eq!(window_uv(&p, 0.1, 0.1), Some([0.0, 0.0]));
        let c = window_uv(&p, 0.9, 0.9).unwrap();
        assert!((c[0] - 1.0).abs() < 1e-6 && (c[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_gloss_matches_graded_vignetted_grained_base() {
        let photo = gradient_photo();
        let lut = desaturate_hald(16);
        let mut p = params();
        p.effects.gloss = 0.0;
        for i in 0..40 {
            let u = 0.12 + i as f32 * 0.019;
            let v = 0.88 - i as f32 * 0.017;
            let iuv = window_uv(&p, u, v).unwrap();
            let t = sample_uv(&photo, iuv[0], iuv[1]);
            let mut c = grade([t[0], t[1], t[2]], &lut, &p);
            c = vignette(c, iuv, p.effects.vignette);
            c = grain(c, iuv, p.effects.grain, p.time);
            assert_eq!(shade_pixel(&photo, &lut, &p, u, v), [c[0], c[1], c[2], 1.0]);
        }
    }

    #[test]
    fn zero_strength_ignores_lut_contents() {
        let photo = gradient_photo();
        let mut p = params();
        p.effects.lut_strength = 0.0;
        let a = shade_pixel(&photo, &identity_hald(16), &p, 0.4, 0.6);
        let b = shade_pixel(&photo, &desaturate_hald(16), &p, 0.4, 0.6);
        assert_eq!(a, b);
    }

    #[test]
    fn gloss_brightens_under_the_light() {
        let photo = RgbaImage::from_pixel(8, 8, Rgba([60, 60, 60, 255]));
        let lut = identity_hald(8);
        let mut p = params();
        p.inset = Inset::uniform(0.0);
        p.hald_size = 8.0;
        p.effects.grain = 0.0;
        p.effects.vignette = 0.0;
        p.light_pos = [0.5, 0.5];
        let lit = shade_pixel(&photo, &lut, &p, 0.5, 0.5);
        p.effects.gloss = 0.0;
        let dry = shade_pixel(&photo, &lut, &p, 0.5, 0.5);
        assert!(lit[0] > dry[0]);
    }

    #[test]
    fn light_straight_above_does_not_produce_nan() {
        let e = EffectParameters::default();
        let c = coat_intensity([0.5, 0.5], &e, [0.5, 0.5]);
        assert!(c.is_finite());
    }

    #[test]
    fn vignette_zero_is_identity() {
        let c = [0.3, 0.6, 0.9];
        assert_eq!(vignette(c, [0.0, 0.0], 0.0), c);
    }

    #[test]
    fn vignette_falloff_and_floor() {
        let white = [1.0, 1.0, 1.0];
        let factor = |iuv: [f32; 2]| vignette(white, iuv, 1.0)[0];
        let expected = |r: f32| {
            let t = ((r - 0.35) / 0.5).clamp(0.0, 1.0);
            1.0 - 0.18 * t * t * (3.0 - 2.0 * t)
        };

        assert_eq!(factor([0.5, 0.5]), 1.0);
        // Corner of the photo: r = |(0.5, 0.55)|.
        let corner = factor([0.0, 0.0]);
        assert!((corner - expected(0.5f32.hypot(0.55))).abs() < 1e-5);
        assert!(corner > 0.82 && corner < 0.86);
        // Past the outer edge the floor is 0.82.
        assert!((factor([-0.5, 0.5]) - 0.82).abs() < 1e-6);
        // Vertical offsets count 1.1× horizontal ones.
        let down = factor([0.5, 0.9]);
        let right = factor([0.9, 0.5]);
        assert!(down < right);
        assert!((down - expected(0.44)).abs() < 1e-5);
        assert!((right - expected(0.4)).abs() < 1e-5);
        // Half strength darkens half as much.
        let half = vignette(white, [0.0, 0.0], 0.5)[0];
        assert!((1.0 - half - 0.5 * (1.0 - corner)).abs() < 1e-5);
    }

    #[test]
    fn fresnel_lifts_tilted_edges_only() {
        let mut e = EffectParameters {
            roll: 0.6,
            fresnel: 0.0,
            ..EffectParameters::default()
        };
        let light = [0.5, 0.2];
        let edge_off = coat_intensity([0.95, 0.9], &e, light);
        let centre_off = coat_intensity([0.5, 0.5], &e, light);
        e.fresnel = 1.5;
        let edge_on = coat_intensity([0.95, 0.9], &e, light);
        let centre_on = coat_intensity([0.5, 0.5], &e, light);

        assert!(edge_on > edge_off + 1e-3);
        // The normal is straight up in the centre: no grazing term.
        assert!((centre_on - centre_off).abs() < 1e-6);
    }

    #[test]
    fn streak_boosts_highlights_along_the_coating_lines() {
        let iuv = [0.5, 0.5];
        let mut e = EffectParameters {
            roll: 0.0,
            spec_power: 20.0,
            streak: 0.0,
            ..EffectParameters::default()
        };
        let t = [0.92f32 / 0.92f32.hypot(0.38), 0.38 / 0.92f32.hypot(0.38)];
        let along = [iuv[0] + 0.2 * t[0], iuv[1] + 0.2 * t[1]];
        let across = [iuv[0] - 0.2 * t[1], iuv[1] + 0.2 * t[0]];

        let along_off = coat_intensity(iuv, &e, along);
        let across_off = coat_intensity(iuv, &e, across);
        e.streak = 1.0;
        let along_on = coat_intensity(iuv, &e, along);
        let across_on = coat_intensity(iuv, &e, across);

        assert!(along_on > along_off + 1e-3);
        assert!((across_on - across_off).abs() < 1e-6);
    }

    #[test]
    fn roll_changes_the_coat_away_from_centre() {
        let mut e = EffectParameters {
            roll: 0.0,
            fresnel: 1.5,
            ..EffectParameters::default()
        };
        let light = [0.55, 0.22];
        let flat = coat_intensity([0.15, 0.85], &e, light);
        e.roll = 0.9;
        let curved = coat_intensity([0.15, 0.85], &e, light);
        assert!((flat - curved).abs() > 1e-3);
    }

    #[test]
    fn grain_stays_within_three_percent_per_unit() {
        let c = [0.5, 0.5, 0.5];
        for i in 0..100 {
            let g = grain(c, [i as f32 * 0.0101, 0.37], 1.0, i as f32 * 0.016);
            assert!((g[0] - 0.5).abs() <= 0.0301);
        }
    }
}
