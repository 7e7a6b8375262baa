//! Render pipelines for probe capture and convolution
//!
//! All passes draw a fullscreen triangle into one face (and one mip) of a
//! cubemap. Pipelines are created on first use per target format.

use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;

pub const CAPTURE_SHADER: &str = concat!(
    include_str!("shaders/probe_common.wgsl"),
    include_str!("shaders/probe_capture.wgsl"),
);

pub const IRRADIANCE_SHADER: &str = concat!(
    include_str!("shaders/probe_common.wgsl"),
    include_str!("shaders/probe_convolve.wgsl"),
    include_str!("shaders/irradiance.wgsl"),
);

pub const GGX_PREFILTER_SHADER: &str = concat!(
    include_str!("shaders/probe_common.wgsl"),
    include_str!("shaders/probe_convolve.wgsl"),
    include_str!("shaders/ggx_prefilter.wgsl"),
);

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Sky colours and face for a capture pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CaptureUniforms {
    pub zenith: [f32; 4],
    pub horizon: [f32; 4],
    pub ground: [f32; 4],
    pub face: u32,
    pub _pad: [u32; 3],
}

/// Face and filter parameters for a convolution pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ConvolveUniforms {
    pub face: u32,
    pub sample_count: u32,
    pub roughness: f32,
    pub source_size: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Sky,
    Irradiance,
    GgxPrefilter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    kind: PassKind,
    format: wgpu::TextureFormat,
    depth: bool,
}

pub struct ProbePipelines {
    capture_shader: wgpu::ShaderModule,
    irradiance_shader: wgpu::ShaderModule,
    prefilter_shader: wgpu::ShaderModule,
    pub capture_layout: wgpu::BindGroupLayout,
    pub convolve_layout: wgpu::BindGroupLayout,
    capture_pipeline_layout: wgpu::PipelineLayout,
    convolve_pipeline_layout: wgpu::PipelineLayout,
    pub sampler: wgpu::Sampler,
    cache: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl ProbePipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let capture_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Probe Capture Shader"),
            source: wgpu::ShaderSource::Wgsl(CAPTURE_SHADER.into()),
        });
        let irradiance_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Probe Irradiance Shader"),
            source: wgpu::ShaderSource::Wgsl(IRRADIANCE_SHADER.into()),
        });
        let prefilter_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Probe GGX Prefilter Shader"),
            source: wgpu::ShaderSource::Wgsl(GGX_PREFILTER_SHADER.into()),
        });

        // Bind group 0: CaptureUniforms
        let capture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
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
            label: Some("Probe Capture Bind Group Layout"),
        });

        // Bind group 0: ConvolveUniforms + source cube + sampler
        let convolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("Probe Convolve Bind Group Layout"),
        });

        let capture_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Probe Capture Pipeline Layout"),
            bind_group_layouts: &[&capture_layout],
            push_constant_ranges: &[],
        });
        let convolve_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Probe Convolve Pipeline Layout"),
            bind_group_layouts: &[&convolve_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Probe Source Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            capture_shader,
            irradiance_shader,
            prefilter_shader,
            capture_layout,
            convolve_layout,
            capture_pipeline_layout,
            convolve_pipeline_layout,
            sampler,
            cache: HashMap::new(),
        }
    }

    /// Pipeline for `kind` rendering into `format`, with a depth attachment
    /// when `depth` is set
    pub fn get(
        &mut self,
        device: &wgpu::Device,
        kind: PassKind,
        format: wgpu::TextureFormat,
        depth: bool,
    ) -> &wgpu::RenderPipeline {
        let key = PipelineKey { kind, format, depth };
        if !self.cache.contains_key(&key) {
            let pipeline = self.build(device, key);
            self.cache.insert(key, pipeline);
        }
        &self.cache[&key]
    }

    fn build(&self, device: &wgpu::Device, key: PipelineKey) -> wgpu::RenderPipeline {
        let (shader, entry_point, layout, label) = match key.kind {
            PassKind::Sky => (&self.capture_shader, "fs_sky", &self.capture_pipeline_layout, "Probe Sky Pipeline"),
            PassKind::Irradiance => (
                &self.irradiance_shader,
                "fs_irradiance",
                &self.convolve_pipeline_layout,
                "Probe Irradiance Pipeline",
            ),
            PassKind::GgxPrefilter => (
                &self.prefilter_shader,
                "fs_prefilter",
                &self.convolve_pipeline_layout,
                "Probe GGX Prefilter Pipeline",
            ),
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_fullscreen"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some(entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{:?}", e));
        module
    }

    fn has_entry_point(module: &naga::Module, name: &str) -> bool {
        module.entry_points.iter().any(|ep| ep.name == name)
    }

    #[test]
    fn test_capture_shader_valid() {
        let module = validate(CAPTURE_SHADER);
        assert!(has_entry_point(&module, "vs_fullscreen"));
        assert!(has_entry_point(&module, "fs_sky"));
    }

    #[test]
    fn test_irradiance_shader_valid() {
        let module = validate(IRRADIANCE_SHADER);
        assert!(has_entry_point(&module, "fs_irradiance"));
    }

    #[test]
    fn test_ggx_shader_valid() {
        let module = validate(GGX_PREFILTER_SHADER);
        assert!(has_entry_point(&module, "fs_prefilter"));
    }

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<CaptureUniforms>(), 64);
        assert_eq!(std::mem::size_of::<ConvolveUniforms>(), 16);
    }
}
