//! Compiled programs, their parameter block and pipeline cache

use std::collections::HashMap;

use crate::device::{ProgramKind, TargetFormat, Uniform, VertexLayout};
use crate::error::DeviceError;

/// Vertex entry point for [`VertexLayout::Position2Uv`]
const QUAD_VERTEX_ENTRY: &str = "vs_quad";
/// Vertex entry point for [`VertexLayout::Position3Uv`]
const BLIT_VERTEX_ENTRY: &str = "vs_blit";
const FRAGMENT_ENTRY: &str = "fs_main";
const COMPUTE_ENTRY: &str = "cs_render_ascii";

/// Binding of the parameter block
pub(super) const PARAMS_BINDING: u32 = 0;
/// Binding of texture slot 0; slot `n` sits at `n + 1`
pub(super) const FIRST_SLOT_BINDING: u32 = 1;
/// Binding of the read-only image unit
pub(super) const SOBEL_IMAGE_BINDING: u32 = 5;
/// Binding of the write-only image unit
pub(super) const OUTPUT_IMAGE_BINDING: u32 = 6;

/// Host mirror of the `Params` block declared in `common.wgsl`
///
/// Field order and padding follow WGSL uniform layout rules: the two `vec3`
/// fields start on 16-byte boundaries and each shares its last word with the
/// scalar that follows. `offset` lands on an 8-byte boundary and the block
/// is padded to a multiple of 16.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub(super) struct ProgramUniforms {
    pass_index: i32,
    edge_threshold: i32,
    edges: u32,
    fill: u32,
    exposure: f32,
    attenuation: f32,
    invert_luminance: u32,
    blend_with_base: f32,
    ascii_color: [f32; 3],
    kernel_size: i32,
    background_color: [f32; 3],
    sigma: f32,
    sigma_scale: f32,
    tau: f32,
    threshold: f32,
    use_normals: u32,
    normal_threshold: f32,
    depth_threshold: f32,
    offset: [f32; 2],
    zoom: f32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

impl Default for ProgramUniforms {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            ..bytemuck::Zeroable::zeroed()
        }
    }
}

impl ProgramUniforms {
    /// Assigns the field called `name`, checking the value's type
    pub fn set(&mut self, name: &str, value: Uniform) -> Result<(), DeviceError> {
        let mismatch = |expected| DeviceError::UniformType { name: name.to_string(), expected };

        match name {
            "pass_index" | "edge_threshold" | "kernel_size" => {
                let Uniform::Int(v) = value else { return Err(mismatch("int")) };
                match name {
                    "pass_index" => self.pass_index = v,
                    "edge_threshold" => self.edge_threshold = v,
                    _ => self.kernel_size = v,
                }
            }
            "edges" | "fill" | "invert_luminance" | "use_normals" => {
                let Uniform::Bool(v) = value else { return Err(mismatch("bool")) };
                let v = v as u32;
                match name {
                    "edges" => self.edges = v,
                    "fill" => self.fill = v,
                    "invert_luminance" => self.invert_luminance = v,
                    _ => self.use_normals = v,
                }
            }
            "exposure" | "attenuation" | "blend_with_base" | "sigma" | "sigma_scale" | "tau" | "threshold" | "normal_threshold" | "depth_threshold" | "zoom" => {
                let Uniform::Float(v) = value else { return Err(mismatch("float")) };
                let field = match name {
                    "exposure" => &mut self.exposure,
                    "attenuation" => &mut self.attenuation,
                    "blend_with_base" => &mut self.blend_with_base,
                    "sigma" => &mut self.sigma,
                    "sigma_scale" => &mut self.sigma_scale,
                    "tau" => &mut self.tau,
                    "threshold" => &mut self.threshold,
                    "normal_threshold" => &mut self.normal_threshold,
                    "depth_threshold" => &mut self.depth_threshold,
                    _ => &mut self.zoom,
                };
                *field = v;
            }
            "offset" => {
                let Uniform::Vec2(v) = value else { return Err(mismatch("vec2")) };
                self.offset = v;
            }
            "ascii_color" | "background_color" => {
                let Uniform::Vec3(v) = value else { return Err(mismatch("vec3")) };
                if name == "ascii_color" {
                    self.ascii_color = v;
                } else {
                    self.background_color = v;
                }
            }
            _ => return Err(DeviceError::UnknownUniform(name.to_string())),
        }

        Ok(())
    }
}

/// Render pipelines differ by output format, vertex layout and topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub format: TargetFormat,
    pub layout: VertexLayout,
    pub strip: bool,
}

/// A program owned by the device
pub(super) enum Program {
    Fragment {
        module: wgpu::ShaderModule,
        pipeline_layout: wgpu::PipelineLayout,
        bind_group_layout: wgpu::BindGroupLayout,
        pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
        uniforms: ProgramUniforms,
    },
    Compute {
        pipeline: wgpu::ComputePipeline,
        bind_group_layout: wgpu::BindGroupLayout,
        uniforms: ProgramUniforms,
    },
    Invalid(String),
}

impl Program {
    pub fn kind(&self) -> Option<ProgramKind> {
        match self {
            Program::Fragment { .. } => Some(ProgramKind::Fragment),
            Program::Compute { .. } => Some(ProgramKind::Compute),
            Program::Invalid(_) => None,
        }
    }

    pub fn uniforms_mut(&mut self) -> Option<&mut ProgramUniforms> {
        match self {
            Program::Fragment { uniforms, .. } | Program::Compute { uniforms, .. } => Some(uniforms),
            Program::Invalid(_) => None,
        }
    }

    /// Builds a program from WGSL source, capturing validation errors
    pub fn compile(device: &wgpu::Device, kind: ProgramKind, label: &str, source: &str) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let bind_group_layout = create_bind_group_layout(device, kind, label);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let program = match kind {
            ProgramKind::Fragment => Program::Fragment {
                module,
                pipeline_layout,
                bind_group_layout,
                pipelines: HashMap::new(),
                uniforms: ProgramUniforms::default(),
            },
            ProgramKind::Compute => {
                // Compute has a single entry point, so its pipeline is built eagerly
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(COMPUTE_ENTRY),
                    compilation_options: Default::default(),
                    cache: None,
                });
                Program::Compute {
                    pipeline,
                    bind_group_layout,
                    uniforms: ProgramUniforms::default(),
                }
            }
        };

        match pollster::block_on(device.pop_error_scope()) {
            Some(error) => {
                tracing::error!(label, %error, "program failed to build");
                Program::Invalid(error.to_string())
            }
            None => program,
        }
    }
}

/// Returns the render pipeline for `key`, building it on first use
pub(super) fn render_pipeline<'p>(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    pipeline_layout: &wgpu::PipelineLayout,
    pipelines: &'p mut HashMap<PipelineKey, wgpu::RenderPipeline>,
    key: PipelineKey,
) -> Result<&'p wgpu::RenderPipeline, DeviceError> {
    if !pipelines.contains_key(&key) {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = create_render_pipeline(device, module, pipeline_layout, key);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(DeviceError::Pipeline(error.to_string()));
        }
        tracing::debug!(?key, "render pipeline created");
        pipelines.insert(key, pipeline);
    }

    pipelines.get(&key).ok_or_else(|| DeviceError::Pipeline(format!("{key:?} missing from cache")))
}

const QUAD_ATTRIBUTES: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];
const BLIT_ATTRIBUTES: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

fn vertex_buffer_layout(layout: VertexLayout) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: layout.stride(),
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: match layout {
            VertexLayout::Position2Uv => QUAD_ATTRIBUTES,
            VertexLayout::Position3Uv => BLIT_ATTRIBUTES,
        },
    }
}

fn create_render_pipeline(device: &wgpu::Device, module: &wgpu::ShaderModule, pipeline_layout: &wgpu::PipelineLayout, key: PipelineKey) -> wgpu::RenderPipeline {
    let vertex_entry = match key.layout {
        VertexLayout::Position2Uv => QUAD_VERTEX_ENTRY,
        VertexLayout::Position3Uv => BLIT_VERTEX_ENTRY,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(vertex_entry),
        layout: Some(pipeline_layout),
        cache: None,
        vertex: wgpu::VertexState {
            module,
            buffers: &[vertex_buffer_layout(key.layout)],
            compilation_options: Default::default(),
            entry_point: Some(vertex_entry),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format.to_wgpu(),
                // Float32 targets are not blendable
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
            entry_point: Some(FRAGMENT_ENTRY),
        }),
        primitive: wgpu::PrimitiveState {
            topology: if key.strip {
                wgpu::PrimitiveTopology::TriangleStrip
            } else {
                wgpu::PrimitiveTopology::TriangleList
            },
            strip_index_format: None,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
            unclipped_depth: false,
        },
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        depth_stencil: None,
    })
}

fn create_bind_group_layout(device: &wgpu::Device, kind: ProgramKind, label: &str) -> wgpu::BindGroupLayout {
    let visibility = match kind {
        ProgramKind::Fragment => wgpu::ShaderStages::FRAGMENT,
        ProgramKind::Compute => wgpu::ShaderStages::COMPUTE,
    };
    // Programs read texels with textureLoad only, so every float format binds
    let sampled = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: PARAMS_BINDING,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ProgramUniforms>() as u64),
        },
        count: None,
    }];
    entries.extend((0..crate::device::TEXTURE_SLOTS as u32).map(|slot| sampled(FIRST_SLOT_BINDING + slot)));

    if kind == ProgramKind::Compute {
        entries.push(sampled(SOBEL_IMAGE_BINDING));
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: OUTPUT_IMAGE_BINDING,
            visibility,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: crate::device::STORAGE_IMAGE_FORMAT.to_wgpu(),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        });
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor { label: Some(label), entries: &entries })
}
