//! `RenderDevice` backed by a headless wgpu device
//!
//! Cubemaps are 6-layer 2D textures. Every capture or convolution call
//! records one command buffer and submits it without waiting; wgpu executes
//! submissions in order, which is all the baker relies on.

use crate::context::GpuContext;
use crate::device::{CaptureClear, CubeFaceCapture, RenderDevice};
use crate::error::RenderError;
use crate::probe_pipeline::{CaptureUniforms, ConvolveUniforms, PassKind, ProbePipelines, DEPTH_FORMAT};
use crate::texture::{CubeFace, PixelFormat, RenderTargetHandle, TextureDesc, TextureHandle, CUBE_FACE_COUNT};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

/// GGX samples per texel
const PREFILTER_SAMPLE_COUNT: u32 = 128;

const SKY_ZENITH: [f32; 4] = [0.25, 0.45, 0.85, 1.0];
const SKY_HORIZON: [f32; 4] = [0.75, 0.82, 0.9, 1.0];
const SKY_GROUND: [f32; 4] = [0.2, 0.18, 0.16, 1.0];

/// Storage format for a probe pixel format. 11/11/10 float is not
/// renderable without an optional feature, so float probes use RGBA16F.
pub fn wgpu_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rg11b10Float => wgpu::TextureFormat::Rgba16Float,
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    desc: TextureDesc,
}

struct GpuRenderTarget {
    texture: TextureHandle,
    depth: Option<wgpu::TextureView>,
}

pub struct WgpuProbeDevice {
    context: GpuContext,
    pipelines: ProbePipelines,
    textures: HashMap<TextureHandle, GpuTexture>,
    targets: HashMap<RenderTargetHandle, GpuRenderTarget>,
    next_target: u32,
    submissions: u64,
}

impl WgpuProbeDevice {
    pub fn new(context: GpuContext) -> Self {
        let pipelines = ProbePipelines::new(&context.device);
        Self {
            context,
            pipelines,
            textures: HashMap::new(),
            targets: HashMap::new(),
            next_target: 0,
            submissions: 0,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Command buffers submitted so far
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture, RenderError> {
        self.textures.get(&handle).ok_or(RenderError::UnknownTexture(handle))
    }

    fn target(&self, handle: RenderTargetHandle) -> Result<&GpuRenderTarget, RenderError> {
        self.targets.get(&handle).ok_or(RenderError::UnknownRenderTarget(handle))
    }

    /// Single-layer 2D view of one face at one mip, for use as an attachment
    fn face_view(texture: &wgpu::Texture, face: u32, level: u32) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Probe Face View"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: face,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    /// Cube view of mip 0, for sampling
    fn source_view(texture: &wgpu::Texture) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Probe Source View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(CUBE_FACE_COUNT as u32),
            ..Default::default()
        })
    }

    fn submit(&mut self, encoder: wgpu::CommandEncoder) {
        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.submissions += 1;
    }

    /// Run a convolution pass over every face of `target` at `level`
    fn convolve(
        &mut self,
        kind: PassKind,
        source: TextureHandle,
        target: RenderTargetHandle,
        level: u32,
        roughness: f32,
    ) -> Result<(), RenderError> {
        let source_tex = self.texture(source)?;
        let source_size = source_tex.desc.size as f32;
        let source_view = Self::source_view(&source_tex.texture);

        let target_texture = self.target(target)?.texture;
        let dest = self.texture(target_texture)?;
        let format = wgpu_format(dest.desc.format);
        let face_views: Vec<wgpu::TextureView> = (0..CUBE_FACE_COUNT as u32)
            .map(|face| Self::face_view(&dest.texture, face, level))
            .collect();

        let device = &self.context.device;
        let bind_groups: Vec<wgpu::BindGroup> = (0..CUBE_FACE_COUNT as u32)
            .map(|face| {
                let uniforms = ConvolveUniforms {
                    face,
                    sample_count: PREFILTER_SAMPLE_COUNT,
                    roughness,
                    source_size,
                };
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Probe Convolve Uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Probe Convolve Bind Group"),
                    layout: &self.pipelines.convolve_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&source_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&self.pipelines.sampler),
                        },
                    ],
                })
            })
            .collect();

        let pipeline = self.pipelines.get(device, kind, format, false);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Probe Convolve Encoder"),
        });
        for (view, bind_group) in face_views.iter().zip(&bind_groups) {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Probe Convolve Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.submit(encoder);
        Ok(())
    }
}

impl RenderDevice for WgpuProbeDevice {
    fn allocate_cubemap(&mut self, texture: TextureHandle, desc: &TextureDesc) -> Result<(), RenderError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Probe Cubemap"),
            size: wgpu::Extent3d {
                width: desc.size,
                height: desc.size,
                depth_or_array_layers: CUBE_FACE_COUNT as u32,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(error) = validation.or(out_of_memory) {
            return Err(RenderError::AllocationFailed {
                texture,
                reason: error.to_string(),
            });
        }

        if let Some(old) = self.textures.insert(
            texture,
            GpuTexture {
                texture: gpu_texture,
                desc: *desc,
            },
        ) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(gpu) = self.textures.remove(&texture) {
            gpu.texture.destroy();
        }
    }

    fn create_render_target(
        &mut self,
        texture: TextureHandle,
        with_depth: bool,
    ) -> Result<RenderTargetHandle, RenderError> {
        let size = self.texture(texture)?.desc.size;

        let depth = with_depth.then(|| {
            let depth_texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Probe Capture Depth"),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
        });

        let handle = RenderTargetHandle(self.next_target);
        self.next_target += 1;
        self.targets.insert(handle, GpuRenderTarget { texture, depth });
        Ok(handle)
    }

    fn release_render_target(&mut self, target: RenderTargetHandle) {
        self.targets.remove(&target);
    }

    fn capture_scene_to_cube_face(
        &mut self,
        capture: &CubeFaceCapture,
        target: RenderTargetHandle,
        face: CubeFace,
    ) -> Result<(), RenderError> {
        let rt = self.target(target)?;
        let dest = self.texture(rt.texture)?;
        let format = wgpu_format(dest.desc.format);
        let view = Self::face_view(&dest.texture, face.index(), 0);
        let has_depth = rt.depth.is_some();

        let clear = match capture.clear {
            CaptureClear::Color(c) => wgpu::Color {
                r: c.r as f64,
                g: c.g as f64,
                b: c.b as f64,
                a: c.a as f64,
            },
            CaptureClear::Sky => wgpu::Color::BLACK,
        };

        let device = &self.context.device;
        let sky_bind_group = match capture.clear {
            CaptureClear::Sky => {
                let uniforms = CaptureUniforms {
                    zenith: SKY_ZENITH,
                    horizon: SKY_HORIZON,
                    ground: SKY_GROUND,
                    face: face.index(),
                    _pad: [0; 3],
                };
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Probe Capture Uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Probe Capture Bind Group"),
                    layout: &self.pipelines.capture_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                }))
            }
            CaptureClear::Color(_) => None,
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Probe Capture Encoder"),
        });
        {
            let depth_view = self.targets.get(&target).and_then(|rt| rt.depth.as_ref());
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Probe Capture Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(bind_group) = &sky_bind_group {
                let pipeline = self.pipelines.get(device, PassKind::Sky, format, has_depth);
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        self.submit(encoder);
        Ok(())
    }

    fn convolve_irradiance(&mut self, source: TextureHandle, target: RenderTargetHandle) -> Result<(), RenderError> {
        self.convolve(PassKind::Irradiance, source, target, 0, 1.0)
    }

    fn convolve_ggx_mip(
        &mut self,
        source: TextureHandle,
        target: RenderTargetHandle,
        max_level: u32,
        level: u32,
    ) -> Result<(), RenderError> {
        let dest = self.texture(self.target(target)?.texture)?;
        if level == 0 || level > max_level || level >= dest.desc.mip_levels {
            return Err(RenderError::InvalidMipLevel {
                level,
                mip_levels: dest.desc.mip_levels,
            });
        }
        let roughness = level as f32 / max_level as f32;
        self.convolve(PassKind::GgxPrefilter, source, target, level, roughness)
    }
}
