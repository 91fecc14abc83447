// ============================================================================
// GPU MODULE - hardware-accelerated polaroid rendering
// ============================================================================
//
// Architecture:
//   context.rs    - wgpu Device, Queue, adapter init
//   shaders.rs    - WGSL source of the polaroid program
//   texture.rs    - photo / LUT textures and the render target
//   compositor.rs - pipeline, uniforms, render pass, readback
//   renderer.rs   - per-card GpuRenderer (owns and releases its resources)
// ============================================================================

pub mod compositor;
pub mod context;
pub mod renderer;
pub mod shaders;
pub mod texture;

pub use context::GpuContext;
pub use renderer::GpuRenderer;
