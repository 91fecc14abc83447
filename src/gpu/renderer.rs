// ============================================================================
// GPU RENDERER - per-card owner of textures, uniforms and the render target
// ============================================================================

use std::sync::Arc;

use bytemuck::Zeroable;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::compositor::{PolaroidPipeline, PolaroidUniforms, readback_texture};
use super::context::GpuContext;
use super::texture::{CardTexture, TargetTexture};
use crate::error::CardError;
use crate::ops::shading::ShadeParams;

/// Everything one card needs on the GPU. The device is shared; textures,
/// buffers and the target are owned and released by [`GpuRenderer::release`].
pub struct GpuRenderer {
    ctx: Arc<GpuContext>,
    pipeline: PolaroidPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bg: wgpu::BindGroup,
    photo: CardTexture,
    lut: CardTexture,
    texture_bg: wgpu::BindGroup,
    target: Option<TargetTexture>,
    /// Cached staging buffer for readback.
    cached_staging_buf: Option<(wgpu::Buffer, u64)>,
    released: bool,
}

impl GpuRenderer {
    /// Upload the photo and LUT and build the pipeline. The caller checks
    /// the photo against [`GpuContext::supports_size`] first.
    pub fn new(ctx: Arc<GpuContext>, photo: &RgbaImage, lut: &RgbaImage) -> Result<Self, CardError> {
        let device = &ctx.device;
        let pipeline = PolaroidPipeline::new(device)?;

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("polaroid_uniforms"),
            contents: bytemuck::bytes_of(&PolaroidUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bg = pipeline.create_uniform_bind_group(device, &uniform_buffer);

        let photo_tex = CardTexture::from_image(device, &ctx.queue, "polaroid_photo", photo);
        let lut_tex = CardTexture::from_image(device, &ctx.queue, "polaroid_lut", lut);
        let texture_bg = pipeline.create_texture_bind_group(device, &photo_tex, &lut_tex);

        Ok(Self {
            ctx,
            pipeline,
            uniform_buffer,
            uniform_bg,
            photo: photo_tex,
            lut: lut_tex,
            texture_bg,
            target: None,
            cached_staging_buf: None,
            released: false,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    /// (Re)create the render target when the surface size changed.
    fn ensure_target(&mut self, width: u32, height: u32) -> Result<(), String> {
        if let Some(t) = &self.target
            && t.width == width
            && t.height == height
        {
            return Ok(());
        }
        if !self.ctx.supports_size(width, height) {
            return Err(format!(
                "surface {}×{} exceeds the device texture limit {}",
                width, height, self.ctx.max_texture_dim
            ));
        }
        if let Some(old) = self.target.take() {
            old.texture.destroy();
        }
        self.target = Some(TargetTexture::new(&self.ctx.device, width, height));
        Ok(())
    }

    /// One render pass into `out` (its size is the target size).
    /// Errors here are runtime failures the caller may recover from by
    /// switching to the CPU pass.
    pub fn render(&mut self, params: &ShadeParams, out: &mut RgbaImage) -> Result<(), String> {
        if self.released {
            return Ok(());
        }
        let (w, h) = out.dimensions();
        self.ensure_target(w, h)?;
        let Some(target) = self.target.as_ref() else {
            return Ok(());
        };

        let uniforms = PolaroidUniforms::from(params);
        self.ctx
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        self.pipeline
            .draw(&self.ctx, target, &self.uniform_bg, &self.texture_bg);

        let data = readback_texture(&self.ctx, &target.texture, w, h, &mut self.cached_staging_buf)?;
        if data.len() != out.len() {
            return Err(format!("readback returned {} bytes, expected {}", data.len(), out.len()));
        }
        out.copy_from_slice(&data);
        Ok(())
    }

    /// Free every GPU resource this card owns. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(t) = self.target.take() {
            t.texture.destroy();
        }
        if let Some((buf, _)) = self.cached_staging_buf.take() {
            buf.destroy();
        }
        self.uniform_buffer.destroy();
        self.photo.texture.destroy();
        self.lut.texture.destroy();
    }
}

impl Drop for GpuRenderer {
    fn drop(&mut self) {
        self.release();
    }
}
