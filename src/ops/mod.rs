// ============================================================================
// OPS - pure pixel math of the polaroid compositor (no I/O, no GPU)
// ============================================================================
//
//   noise.rs    - hash / value noise / smoothstep
//   sampling.rs - clamp-to-edge bilinear fetches
//   lut.rs      - HALD LUT container, lookup and generators
//   shading.rs  - per-pixel recipe (CPU reference of the WGSL program)
//   overlay.rs  - frame / paper compositing of the finished card

pub mod lut;
pub mod noise;
pub mod overlay;
pub mod sampling;
pub mod shading;
