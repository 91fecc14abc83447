// ============================================================================
// NOISE - deterministic hash + value noise shared by grain and sparkle
// ============================================================================
//
// Everything here is a pure function of its inputs so the CPU pass and the
// WGSL program (see gpu/shaders.rs) produce the same lattice.

/// GLSL-style `fract`: always in [0, 1), also for negative inputs.
#[inline]
pub fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// GLSL-style `mix`: `a * (1 - t) + b * t`.
#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Hermite smoothstep between `edge0` and `edge1`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Trigonometric lattice hash in [0, 1).
#[inline]
pub fn hash(px: f32, py: f32) -> f32 {
    fract((px * 127.1 + py * 311.7).sin() * 43758.5453)
}

/// Smooth value noise over the `hash` lattice, roughly in [0, 1].
pub fn value_noise(px: f32, py: f32) -> f32 {
    let ix = px.floor();
    let iy = py.floor();
    let fx = px - ix;
    let fy = py - iy;

    let a = hash(ix, iy);
    let b = hash(ix + 1.0, iy);
    let c = hash(ix, iy + 1.0);
    let d = hash(ix + 1.0, iy + 1.0);

    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);

    mix(a, b, ux) + (c - a) * uy * (1.0 - ux) + (d - b) * ux * uy
}

/// Film grain sample for a photo-space coordinate at `time` seconds,
/// centred on zero (range about ±0.5).
#[inline]
pub fn grain_sample(u: f32, v: f32, time: f32) -> f32 {
    value_noise(u * 1920.0 + time * 60.0, v * 1080.0 + time * 60.0) - 0.5
}

/// Static micro-sparkle of the laminate, already weighted.
#[inline]
pub fn sparkle_sample(u: f32, v: f32) -> f32 {
    value_noise(u * 540.0, v * 540.0).max(0.0).powi(3) * 0.15
}
