// ============================================================================
// GPU SHADERS - WGSL source kept inline
// ============================================================================

// ============================================================================
// POLAROID SHADER - photo window, HALD grade, vignette, grain and gloss coat
// ============================================================================
//
// Fullscreen quad drawn from `vertex_index` (no vertex buffers). The fragment
// stage is the GPU twin of `ops::shading::shade_pixel`; keep both in step.
//
// All texture reads use `textureSampleLevel` so they are legal inside the
// non-uniform branches (window test, grading gate).
pub const POLAROID_SHADER: &str = r#"
struct PolaroidUniforms {
    inset: vec4<f32>,        // top, right, bottom, left
    light_pos: vec2<f32>,
    hald_size: f32,
    lut_strength: f32,
    vignette: f32,
    grain: f32,
    gloss: f32,
    spec_power: f32,
    fresnel: f32,
    roll: f32,
    streak: f32,
    time: f32,
};

@group(0) @binding(0) var<uniform> u: PolaroidUniforms;
@group(1) @binding(0) var photo_tex: texture_2d<f32>;
@group(1) @binding(1) var lut_tex: texture_2d<f32>;
@group(1) @binding(2) var samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let p = positions[vi];

    var out: VertexOutput;
    // uv origin top-left, y down; NDC y up.
    out.position = vec4<f32>(p.x * 2.0 - 1.0, 1.0 - p.y * 2.0, 0.0, 1.0);
    out.uv = p;
    return out;
}

fn hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(127.1, 311.7))) * 43758.5453);
}

fn noise(p: vec2<f32>) -> f32 {
    let i = floor(p);
    let f = fract(p);
    let a = hash(i);
    let b = hash(i + vec2<f32>(1.0, 0.0));
    let c = hash(i + vec2<f32>(0.0, 1.0));
    let d = hash(i + vec2<f32>(1.0, 1.0));
    let w = f * f * (3.0 - 2.0 * f);
    return mix(a, b, w.x) + (c - a) * w.y * (1.0 - w.x) + (d - b) * w.x * w.y;
}

fn apply_hald_lut(color: vec3<f32>, n: f32) -> vec3<f32> {
    let n1 = n - 1.0;
    let blue = color.b * n1;
    let s0 = floor(blue);
    let s1 = min(n1, s0 + 1.0);
    let f = blue - s0;
    let rg = color.rg * n1;
    let area = n * n;

    let t0 = vec2<f32>(s0 - n * floor(s0 / n), floor(s0 / n));
    let t1 = vec2<f32>(s1 - n * floor(s1 / n), floor(s1 / n));
    let uv0 = (rg + t0 * n + 0.5) / area;
    let uv1 = (rg + t1 * n + 0.5) / area;

    let c0 = textureSampleLevel(lut_tex, samp, uv0, 0.0).rgb;
    let c1 = textureSampleLevel(lut_tex, samp, uv1, 0.0).rgb;
    return mix(c0, c1, f);
}

fn safe_normalize3(v: vec3<f32>) -> vec3<f32> {
    let l = length(v);
    if (l == 0.0) {
        return vec3<f32>(0.0);
    }
    return v / l;
}

fn coat_intensity(iuv: vec2<f32>) -> f32 {
    let V = vec3<f32>(0.0, 0.0, 1.0);
    let L = safe_normalize3(vec3<f32>(u.light_pos - iuv, 0.75));

    let p = (iuv - 0.5) * vec2<f32>(1.0, 1.2);
    let pr = clamp(length(p), 0.0, 1.0);
    let N = safe_normalize3(vec3<f32>(p * u.roll, 1.0 - pr * u.roll));

    let H = safe_normalize3(L + V);
    var spec = pow(max(dot(N, H), 0.0), u.spec_power);

    let T = normalize(vec2<f32>(0.92, 0.38));
    let hl = length(H.xy);
    var aniso = 0.0;
    if (hl > 0.0) {
        aniso = pow(abs(dot(H.xy / hl, T)), 8.0);
    }
    spec = spec * mix(1.0, 1.0 + 2.0 * aniso, u.streak);

    let edge = pow(1.0 - max(dot(N, V), 0.0), 2.2) * u.fresnel;
    let sparkle = pow(max(noise(iuv * 540.0), 0.0), 3.0) * 0.15;

    return spec * 0.95 + edge * 0.18 + sparkle;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let uv = in.uv;
    let min_p = vec2<f32>(u.inset.w, u.inset.x);
    let max_p = vec2<f32>(1.0 - u.inset.y, 1.0 - u.inset.z);
    if (uv.x < min_p.x || uv.x > max_p.x || uv.y < min_p.y || uv.y > max_p.y) {
        return vec4<f32>(0.0);
    }
    let iuv = (uv - min_p) / (max_p - min_p);

    var color = textureSampleLevel(photo_tex, samp, iuv, 0.0).rgb;

    if (u.hald_size > 1.0 && u.lut_strength > 0.0) {
        color = mix(color, apply_hald_lut(color, u.hald_size), u.lut_strength);
    }

    let r = length((iuv - 0.5) * vec2<f32>(1.0, 1.1));
    color = color * mix(1.0, 0.82, smoothstep(0.35, 0.85, r) * u.vignette);

    if (u.grain > 0.0) {
        let g = noise(iuv * vec2<f32>(1920.0, 1080.0) + u.time * 60.0) - 0.5;
        color = clamp(color + vec3<f32>(g * 0.06 * u.grain), vec3<f32>(0.0), vec3<f32>(1.0));
    }

    if (u.gloss != 0.0) {
        let coat = coat_intensity(iuv) * u.gloss;
        color = clamp(color + vec3<f32>(coat), vec3<f32>(0.0), vec3<f32>(1.0));
    }

    return vec4<f32>(color, 1.0);
}
"#;
