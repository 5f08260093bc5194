//! [`RenderDevice`] implemented on wgpu
//!
//! wgpu has no global binding state, so the device keeps it on the host:
//! bound slots, image units and the active program are resolved into a bind
//! group at every draw or dispatch. Commands are recorded into one encoder
//! and submitted at memory barriers and readbacks.

mod program;
mod texture;

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use program::{FIRST_SLOT_BINDING, OUTPUT_IMAGE_BINDING, PARAMS_BINDING, PipelineKey, Program, SOBEL_IMAGE_BINDING, render_pipeline};
use texture::{GpuTexture, UPLOAD_USAGE, allowed_usages, create_texture, decode_texels, read_texture_bytes, target_usage, write_rgba8};

pub use texture::TexelData;

use super::{
    BufferId, BufferKind, DrawTarget, FeatureLevel, FramebufferId, FramebufferStatus, IMAGE_UNITS, ImageAccess, Mesh, ProgramId, ProgramKind, ProgramStatus, RenderDevice, STORAGE_IMAGE_FORMAT,
    TEXTURE_SLOTS, TargetFormat, TextureId, Topology, Uniform,
};
use crate::codec::PixelBuffer;
use crate::error::DeviceError;
use crate::shaders::{COMPUTE_PROGRAM_WGSL, FRAGMENT_PROGRAM_WGSL};

/// Programs compiled from the bundled WGSL sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinPrograms {
    /// The fragment program shared by every pass
    pub composite: ProgramId,
    /// The compute composite; `None` below [`FeatureLevel::Compute`]
    pub compute: Option<ProgramId>,
}

/// A wgpu device and queue plus the host-side binding state
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    feature_level: FeatureLevel,
    /// Usages the adapter allows per format
    format_usages: HashMap<TargetFormat, wgpu::TextureUsages>,
    next_handle: u32,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    programs: HashMap<ProgramId, Program>,
    slots: [Option<TextureId>; TEXTURE_SLOTS],
    images: [Option<(TextureId, ImageAccess)>; IMAGE_UNITS],
    active_program: Option<ProgramId>,
    encoder: Option<wgpu::CommandEncoder>,
    /// The default surface, recreated when a draw asks for another size
    surface: Option<GpuTexture>,
    /// Bound to slots that have nothing bound
    placeholder: GpuTexture,
}

impl WgpuDevice {
    /// Opens the best available adapter
    ///
    /// The feature level is [`FeatureLevel::Compute`] when the adapter runs
    /// compute shaders, otherwise the device is requested with WebGL2 limits.
    pub async fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DeviceError::NoAdapter(e.to_string()))?;

        let info = adapter.get_info();
        let feature_level = if adapter.get_downlevel_capabilities().flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            FeatureLevel::Compute
        } else {
            FeatureLevel::Basic
        };
        let base_limits = match feature_level {
            FeatureLevel::Compute => wgpu::Limits::downlevel_defaults(),
            FeatureLevel::Basic => wgpu::Limits::downlevel_webgl2_defaults(),
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ascii-wgpu"),
                required_features: wgpu::Features::empty(),
                required_limits: base_limits.using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await?;

        tracing::info!(adapter = %info.name, backend = ?info.backend, ?feature_level, "GPU device opened");
        Ok(Self::from_device(&adapter, device, queue, feature_level))
    }

    /// Wraps a device already opened on `adapter`
    pub fn from_device(adapter: &wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue, feature_level: FeatureLevel) -> Self {
        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured device error");
        }));

        let format_usages = TargetFormat::ALL.into_iter().map(|format| (format, allowed_usages(adapter, &device, format))).collect();

        let placeholder = create_texture(&device, "Empty Slot", 1, 1, TargetFormat::Rgba8Unorm, UPLOAD_USAGE);
        write_rgba8(&queue, &placeholder.texture, 1, 1, &[0; 4]);

        Self {
            device,
            queue,
            feature_level,
            format_usages,
            next_handle: 0,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            slots: [None; TEXTURE_SLOTS],
            images: [None; IMAGE_UNITS],
            active_program: None,
            encoder: None,
            surface: None,
            placeholder,
        }
    }

    /// Caps the feature level, e.g. to force the fragment composite
    ///
    /// The level can only be lowered; asking for more than the adapter
    /// offers keeps the detected level.
    pub fn with_feature_level(mut self, level: FeatureLevel) -> Self {
        if level < self.feature_level {
            tracing::info!(from = ?self.feature_level, to = ?level, "feature level lowered");
            self.feature_level = level;
        }
        self
    }

    /// Builds a program from WGSL source
    ///
    /// Build failures do not abort; they show up as
    /// [`ProgramStatus::Invalid`] from [`program_status`](RenderDevice::program_status).
    pub fn compile_program(&mut self, kind: ProgramKind, label: &str, source: &str) -> ProgramId {
        let id = ProgramId(self.next_id());

        let program = if kind == ProgramKind::Compute && self.feature_level < FeatureLevel::Compute {
            Program::Invalid(format!("compute programs need {:?}", FeatureLevel::Compute))
        } else {
            Program::compile(&self.device, kind, label, source)
        };

        tracing::debug!(%id, label, ?kind, valid = program.kind().is_some(), "program compiled");
        self.programs.insert(id, program);
        id
    }

    /// Compiles the bundled fragment and compute programs
    ///
    /// The compute program is only built when the feature level allows it.
    pub fn compile_builtin_programs(&mut self) -> BuiltinPrograms {
        let composite = self.compile_program(ProgramKind::Fragment, "ASCII passes", FRAGMENT_PROGRAM_WGSL);
        let compute = (self.feature_level >= FeatureLevel::Compute).then(|| self.compile_program(ProgramKind::Compute, "ASCII compute composite", COMPUTE_PROGRAM_WGSL));
        BuiltinPrograms { composite, compute }
    }

    /// Reads a texture back with its full precision
    pub fn read_texture(&mut self, texture: TextureId) -> Result<TexelData, DeviceError> {
        self.flush();
        let gpu_texture = self.texture(texture)?;
        let (width, height) = gpu_texture.size();
        let bytes = read_texture_bytes(&self.device, &self.queue, gpu_texture)?;
        Ok(decode_texels(gpu_texture.format, width, height, &bytes))
    }

    fn next_id(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn texture(&self, texture: TextureId) -> Result<&GpuTexture, DeviceError> {
        self.textures.get(&texture).ok_or(DeviceError::UnknownHandle { kind: "texture", id: texture.0 })
    }

    fn buffer(&self, buffer: BufferId) -> Result<&wgpu::Buffer, DeviceError> {
        self.buffers.get(&buffer).ok_or(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 })
    }

    /// Submits the commands recorded so far
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Resolves a draw target to its view, format and texture handle
    ///
    /// The surface has no handle, it can never be sampled.
    fn resolve_target(&mut self, target: DrawTarget) -> Result<(wgpu::TextureView, TargetFormat, Option<TextureId>), DeviceError> {
        match target {
            DrawTarget::Framebuffer(framebuffer) => {
                if self.framebuffer_status(framebuffer) != FramebufferStatus::Complete {
                    return Err(DeviceError::MissingAttachment);
                }
                let texture = self
                    .framebuffers
                    .get(&framebuffer)
                    .copied()
                    .flatten()
                    .ok_or(DeviceError::MissingAttachment)?;
                let gpu_texture = self.texture(texture)?;
                Ok((gpu_texture.view.clone(), gpu_texture.format, Some(texture)))
            }
            DrawTarget::Surface { width, height } => {
                let surface = self.surface(width, height);
                Ok((surface.view.clone(), surface.format, None))
            }
        }
    }

    fn surface(&mut self, width: u32, height: u32) -> &GpuTexture {
        if self.surface.as_ref().is_some_and(|surface| surface.size() != (width, height)) {
            self.surface = None;
        }
        let device = &self.device;
        self.surface.get_or_insert_with(|| {
            tracing::debug!(width, height, "default surface created");
            let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::TEXTURE_BINDING;
            create_texture(device, "Default Surface", width, height, TargetFormat::Rgba8Unorm, usage)
        })
    }

    /// Views for the four texture slots, refusing the output being written
    fn slot_views(&self, output: Option<TextureId>) -> Result<Vec<wgpu::TextureView>, DeviceError> {
        self.slots
            .iter()
            .map(|slot| match *slot {
                Some(texture) if Some(texture) == output => Err(DeviceError::Pipeline(format!("{texture} is both sampled and written"))),
                Some(texture) => Ok(self.texture(texture)?.view.clone()),
                None => Ok(self.placeholder.view.clone()),
            })
            .collect()
    }

    fn active_program(&self, expected: ProgramKind) -> Result<ProgramId, DeviceError> {
        let id = self.active_program.ok_or(DeviceError::NoActiveProgram)?;
        match self.programs.get(&id) {
            None => Err(DeviceError::UnknownHandle { kind: "program", id: id.0 }),
            Some(Program::Invalid(reason)) => Err(DeviceError::InvalidProgram(id, reason.clone())),
            Some(program) if program.kind() != Some(expected) => Err(DeviceError::ProgramKindMismatch(
                id,
                match expected {
                    ProgramKind::Fragment => "fragment",
                    ProgramKind::Compute => "compute",
                },
            )),
            Some(_) => Ok(id),
        }
    }
}

fn params_buffer(device: &wgpu::Device, uniforms: &program::ProgramUniforms) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Program Parameters"),
        contents: bytemuck::bytes_of(uniforms),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

impl RenderDevice for WgpuDevice {
    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn program_status(&self, program: ProgramId) -> ProgramStatus {
        match self.programs.get(&program) {
            Some(Program::Invalid(reason)) => ProgramStatus::Invalid(reason.clone()),
            Some(program) => program.kind().map_or(ProgramStatus::Unknown, ProgramStatus::Ready),
            None => ProgramStatus::Unknown,
        }
    }

    fn create_texture(&mut self, width: u32, height: u32, format: TargetFormat) -> Option<TextureId> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            tracing::warn!(width, height, max, "texture size out of range");
            return None;
        }

        let storage = format == STORAGE_IMAGE_FORMAT && self.feature_level >= FeatureLevel::Compute;
        let allowed = self.format_usages.get(&format).copied().unwrap_or(wgpu::TextureUsages::empty());
        let usage = target_usage(allowed, storage);

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let gpu_texture = create_texture(&self.device, &format!("{format:?} Target"), width, height, format, usage);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = validation.or(out_of_memory) {
            tracing::warn!(width, height, ?format, %error, "texture allocation failed");
            return None;
        }

        let id = TextureId(self.next_id());
        self.textures.insert(id, gpu_texture);
        Some(id)
    }

    fn upload_texture(&mut self, pixels: &PixelBuffer) -> Option<TextureId> {
        let (width, height) = (pixels.width, pixels.height);
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            tracing::warn!(width, height, max, "upload size out of range");
            return None;
        }

        let gpu_texture = create_texture(&self.device, "Uploaded Texture", width, height, TargetFormat::Rgba8Unorm, UPLOAD_USAGE | wgpu::TextureUsages::COPY_SRC);
        write_rgba8(&self.queue, &gpu_texture.texture, width, height, &pixels.to_rgba8());

        let id = TextureId(self.next_id());
        self.textures.insert(id, gpu_texture);
        Some(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        // Recorded commands keep their own reference, so dropping is safe
        if self.textures.remove(&texture).is_none() {
            tracing::warn!(%texture, "deleting unknown texture");
            return;
        }
        for slot in self.slots.iter_mut().filter(|slot| **slot == Some(texture)) {
            *slot = None;
        }
        for image in self.images.iter_mut().filter(|image| matches!(image, Some((bound, _)) if *bound == texture)) {
            *image = None;
        }
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let id = FramebufferId(self.next_id());
        self.framebuffers.insert(id, None);
        Some(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            tracing::warn!(%framebuffer, "deleting unknown framebuffer");
        }
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        match self.framebuffers.get_mut(&framebuffer) {
            Some(attachment) => *attachment = Some(texture),
            None => tracing::warn!(%framebuffer, %texture, "attaching to unknown framebuffer"),
        }
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(Some(texture)) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::MissingAttachment;
        };
        match self.textures.get(texture) {
            None => FramebufferStatus::UnknownAttachment,
            Some(gpu_texture) if !gpu_texture.supports(wgpu::TextureUsages::RENDER_ATTACHMENT) => FramebufferStatus::NotRenderable(gpu_texture.format),
            Some(_) => FramebufferStatus::Complete,
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Option<BufferId> {
        if contents.is_empty() {
            return None;
        }

        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(match kind {
                BufferKind::Vertex => "Vertex Buffer",
                BufferKind::Index => "Index Buffer",
            }),
            contents,
            usage: match kind {
                BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
                BufferKind::Index => wgpu::BufferUsages::INDEX,
            },
        });

        let id = BufferId(self.next_id());
        self.buffers.insert(id, buffer);
        Some(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            tracing::warn!(%buffer, "deleting unknown buffer");
        }
    }

    fn bind_texture(&mut self, slot: usize, texture: Option<TextureId>) {
        match self.slots.get_mut(slot) {
            Some(bound) => *bound = texture,
            None => tracing::warn!(slot, "texture slot out of range"),
        }
    }

    fn bind_image(&mut self, unit: usize, texture: Option<TextureId>, access: ImageAccess) {
        match self.images.get_mut(unit) {
            Some(bound) => *bound = texture.map(|texture| (texture, access)),
            None => tracing::warn!(unit, "image unit out of range"),
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.active_program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) -> Result<(), DeviceError> {
        match self.programs.get_mut(&program) {
            None => Err(DeviceError::UnknownHandle { kind: "program", id: program.0 }),
            Some(Program::Invalid(reason)) => Err(DeviceError::InvalidProgram(program, reason.clone())),
            Some(compiled) => match compiled.uniforms_mut() {
                Some(uniforms) => uniforms.set(name, value),
                None => Err(DeviceError::InvalidProgram(program, "no parameter block".into())),
            },
        }
    }

    fn draw(&mut self, target: DrawTarget, mesh: &Mesh) -> Result<(), DeviceError> {
        let program_id = self.active_program(ProgramKind::Fragment)?;
        let (output_view, format, output) = self.resolve_target(target)?;
        let views = self.slot_views(output)?;
        let vertex_buffer = self.buffer(mesh.vertex_buffer)?.clone();
        let (index_buffer, element_count) = match mesh.topology {
            Topology::IndexedTriangles { index_buffer, index_count } => (Some(self.buffer(index_buffer)?.clone()), index_count),
            Topology::TriangleStrip { vertex_count } => (None, vertex_count),
        };

        let key = PipelineKey {
            format,
            layout: mesh.layout,
            strip: matches!(mesh.topology, Topology::TriangleStrip { .. }),
        };

        let Some(Program::Fragment {
            module,
            pipeline_layout,
            bind_group_layout,
            pipelines,
            uniforms,
        }) = self.programs.get_mut(&program_id)
        else {
            return Err(DeviceError::ProgramKindMismatch(program_id, "fragment"));
        };

        let params = params_buffer(&self.device, uniforms);

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: PARAMS_BINDING,
            resource: params.as_entire_binding(),
        }];
        entries.extend(views.iter().zip(FIRST_SLOT_BINDING..).map(|(view, binding)| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass Bindings"),
            layout: bind_group_layout,
            entries: &entries,
        });

        let pipeline = render_pipeline(&self.device, module, pipeline_layout, pipelines, key)?;

        let device = &self.device;
        let encoder = self
            .encoder
            .get_or_insert_with(|| device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("ASCII Encoder") }));

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ASCII Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &output_view,
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

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        match index_buffer {
            Some(index_buffer) => {
                render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..element_count, 0, 0..1);
            }
            None => render_pass.draw(0..element_count, 0..1),
        }

        Ok(())
    }

    fn dispatch_compute(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<(), DeviceError> {
        let program_id = self.active_program(ProgramKind::Compute)?;

        let (sobel, _) = self.images[0].ok_or(DeviceError::ImageUnitUnbound(0))?;
        let (output, access) = self.images[1].ok_or(DeviceError::ImageUnitUnbound(1))?;
        if access != ImageAccess::WriteOnly {
            return Err(DeviceError::Pipeline(format!("{output} must be bound write-only")));
        }
        let output_texture = self.texture(output)?;
        if output_texture.format != STORAGE_IMAGE_FORMAT || !output_texture.supports(wgpu::TextureUsages::STORAGE_BINDING) {
            return Err(DeviceError::Pipeline(format!("{output} is not a {STORAGE_IMAGE_FORMAT:?} storage image")));
        }
        let output_view = output_texture.view.clone();
        let sobel_view = self.texture(sobel)?.view.clone();
        let views = self.slot_views(Some(output))?;

        let Some(Program::Compute {
            pipeline,
            bind_group_layout,
            uniforms,
        }) = self.programs.get(&program_id)
        else {
            return Err(DeviceError::ProgramKindMismatch(program_id, "compute"));
        };

        let params = params_buffer(&self.device, uniforms);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: PARAMS_BINDING,
            resource: params.as_entire_binding(),
        }];
        entries.extend(views.iter().zip(FIRST_SLOT_BINDING..).map(|(view, binding)| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        entries.push(wgpu::BindGroupEntry {
            binding: SOBEL_IMAGE_BINDING,
            resource: wgpu::BindingResource::TextureView(&sobel_view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: OUTPUT_IMAGE_BINDING,
            resource: wgpu::BindingResource::TextureView(&output_view),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compute Composite Bindings"),
            layout: bind_group_layout,
            entries: &entries,
        });

        let device = &self.device;
        let encoder = self
            .encoder
            .get_or_insert_with(|| device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("ASCII Encoder") }));

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("ASCII Compute Composite"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(groups_x, groups_y, groups_z);

        Ok(())
    }

    fn memory_barrier(&mut self) {
        // Passes within a submission are already ordered; submitting here
        // bounds the amount of recorded work
        self.flush();
    }

    fn read_pixels(&mut self, target: DrawTarget, width: u32, height: u32) -> Result<Vec<u8>, DeviceError> {
        self.flush();

        let gpu_texture = match target {
            DrawTarget::Surface { .. } => self.surface.as_ref().ok_or_else(|| DeviceError::Readback("nothing has been drawn to the surface".into()))?,
            DrawTarget::Framebuffer(framebuffer) => {
                let texture = self.framebuffers.get(&framebuffer).copied().flatten().ok_or(DeviceError::MissingAttachment)?;
                self.texture(texture)?
            }
        };

        let size = gpu_texture.size();
        if size != (width, height) {
            return Err(DeviceError::Readback(format!("requested {width}x{height} from a {}x{} target", size.0, size.1)));
        }

        let bytes = read_texture_bytes(&self.device, &self.queue, gpu_texture)?;
        Ok(decode_texels(gpu_texture.format, width, height, &bytes).to_rgb8())
    }
}
