// ============================================================================
// COMPOSITOR - the polaroid render pipeline and texture readback
// ============================================================================
//
// One fixed program (POLAROID_SHADER). Per frame only the uniform buffer
// changes; the photo and LUT bind group is built once per card.
//
//   group 0: PolaroidUniforms
//   group 1: photo texture, LUT texture, linear clamp sampler
//
// Hardware blending is disabled: the fragment stage writes alpha itself
// (0 outside the photo window) over a transparent clear.
// ============================================================================

use bytemuck::{Pod, Zeroable};

use super::context::GpuContext;
use super::texture::{CardTexture, TargetTexture};
use crate::error::CardError;
use crate::ops::shading::ShadeParams;

// ============================================================================
// UNIFORM TYPES
// ============================================================================

/// Mirrors `struct PolaroidUniforms` in the WGSL source (64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PolaroidUniforms {
    pub inset: [f32; 4],
    pub light_pos: [f32; 2],
    pub hald_size: f32,
    pub lut_strength: f32,
    pub vignette: f32,
    pub grain: f32,
    pub gloss: f32,
    pub spec_power: f32,
    pub fresnel: f32,
    pub roll: f32,
    pub streak: f32,
    pub time: f32,
}

impl From<&ShadeParams> for PolaroidUniforms {
    fn from(p: &ShadeParams) -> Self {
        let e = &p.effects;
        Self {
            inset: p.inset.to_array(),
            light_pos: p.light_pos,
            hald_size: p.hald_size,
            lut_strength: e.lut_strength,
            vignette: e.vignette,
            grain: e.grain,
            gloss: e.gloss,
            spec_power: e.spec_power,
            fresnel: e.fresnel,
            roll: e.roll,
            streak: e.streak,
            time: p.time,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct PolaroidPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub uniform_bind_group_layout: wgpu::BindGroupLayout,
    pub texture_bind_group_layout: wgpu::BindGroupLayout,
    pub sampler_linear: wgpu::Sampler,
    pub output_format: wgpu::TextureFormat,
}

impl PolaroidPipeline {
    pub fn new(device: &wgpu::Device) -> Result<Self, CardError> {
        Self::from_source(device, super::shaders::POLAROID_SHADER)
    }

    /// Compile `source` and build the pipeline. Validation errors are
    /// captured with an error scope and returned instead of panicking.
    pub fn from_source(device: &wgpu::Device, source: &str) -> Result<Self, CardError> {
        let output_format = wgpu::TextureFormat::Rgba8Unorm;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("polaroid_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("polaroid_uniform_bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("polaroid_texture_bgl"),
                entries: &[
                    texture_entry(0),
                    texture_entry(1),
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("polaroid_pipeline_layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("polaroid_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CardError::ShaderProgram(err.to_string()));
        }

        let sampler_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("polaroid_sampler_linear"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            pipeline,
            uniform_bind_group_layout,
            texture_bind_group_layout,
            sampler_linear,
            output_format,
        })
    }

    pub fn create_uniform_bind_group(
        &self,
        device: &wgpu::Device,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("polaroid_uniform_bg"),
            layout: &self.uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    pub fn create_texture_bind_group(
        &self,
        device: &wgpu::Device,
        photo: &CardTexture,
        lut: &CardTexture,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("polaroid_texture_bg"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&photo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&lut.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler_linear),
                },
            ],
        })
    }

    /// Clear the target to transparent and draw the fullscreen quad.
    pub fn draw(
        &self,
        ctx: &GpuContext,
        target: &TargetTexture,
        uniform_bg: &wgpu::BindGroup,
        texture_bg: &wgpu::BindGroup,
    ) {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("polaroid_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("polaroid_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, uniform_bg, &[]);
            pass.set_bind_group(1, texture_bg, &[]);
            pass.draw(0..6, 0..1);
        }

        ctx.submit_one(encoder);
    }
}

// ============================================================================
// READBACK
// ============================================================================

/// Copy a texture into a CPU buffer of tightly packed RGBA rows.
/// The staging buffer is cached across frames and regrown when too small.
pub fn readback_texture(
    ctx: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    cached_staging: &mut Option<(wgpu::Buffer, u64)>,
) -> Result<Vec<u8>, String> {
    let device = &ctx.device;

    let bytes_per_row = aligned_bytes_per_row(width);
    let buffer_size = (bytes_per_row * height) as u64;

    let need_new = !matches!(cached_staging, Some((_, sz)) if *sz >= buffer_size);
    if need_new {
        if let Some((old, _)) = cached_staging.take() {
            old.destroy();
        }
        let new_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        *cached_staging = Some((new_buf, buffer_size));
    }
    let Some((staging, _)) = cached_staging.as_ref() else {
        return Err("staging buffer missing".to_string());
    };

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });

    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    ctx.submit_one(encoder);

    let slice = staging.slice(..buffer_size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(format!("readback map error: {:?}", e)),
        Err(e) => return Err(format!("readback channel error: {:?}", e)),
    }

    let mapped = slice.get_mapped_range();
    let actual_row = width * 4;

    let mut result = Vec::with_capacity((actual_row * height) as usize);
    for y in 0..height {
        let start = (y * bytes_per_row) as usize;
        let end = start + actual_row as usize;
        result.extend_from_slice(&mapped[start..end]);
    }

    drop(mapped);
    staging.unmap();

    Ok(result)
}

/// `bytes_per_row` for buffer copies must be a multiple of 256.
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}
