//! A [`RenderDevice`] that records calls instead of rendering
//!
//! Handles are checked strictly: deleting a handle twice, or one the device
//! never issued, panics. Tests read the call log and the live-resource
//! counters to verify ordering and cleanup.

use std::collections::{HashMap, HashSet};

use super::*;
use crate::targets::GlyphTextures;

/// State captured at a draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: DrawTarget,
    /// Texture attached to the target framebuffer, if any
    pub attachment: Option<TextureId>,
    pub slots: [Option<TextureId>; TEXTURE_SLOTS],
    pub mesh: Mesh,
    pub program: ProgramId,
    /// Value of the program's `pass_index` parameter
    pub pass_index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTexture { id: TextureId, width: u32, height: u32, format: TargetFormat },
    UploadTexture { id: TextureId, width: u32, height: u32 },
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    Attach { framebuffer: FramebufferId, texture: TextureId },
    CreateBuffer { id: BufferId, kind: BufferKind, size: usize },
    DeleteBuffer(BufferId),
    BindTexture { slot: usize, texture: Option<TextureId> },
    BindImage { unit: usize, texture: Option<TextureId>, access: ImageAccess },
    UseProgram(ProgramId),
    SetUniform { program: ProgramId, name: String, value: Uniform },
    Draw(DrawRecord),
    Dispatch { program: ProgramId, groups: [u32; 3] },
    MemoryBarrier,
    ReadPixels { target: DrawTarget, width: u32, height: u32 },
}

pub struct RecordingDevice {
    feature_level: FeatureLevel,
    next_handle: u32,
    calls: Vec<Call>,
    programs: HashMap<ProgramId, ProgramStatus>,
    uniforms: HashMap<(ProgramId, String), Uniform>,
    textures: HashMap<TextureId, TargetFormat>,
    external_textures: HashSet<TextureId>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    buffers: HashSet<BufferId>,
    slots: [Option<TextureId>; TEXTURE_SLOTS],
    active_program: Option<ProgramId>,
    texture_allocations_left: Option<usize>,
    incomplete_framebuffers: bool,
    truncate_readback: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            feature_level: FeatureLevel::Compute,
            next_handle: 1,
            calls: Vec::new(),
            programs: HashMap::new(),
            uniforms: HashMap::new(),
            textures: HashMap::new(),
            external_textures: HashSet::new(),
            framebuffers: HashMap::new(),
            buffers: HashSet::new(),
            slots: [None; TEXTURE_SLOTS],
            active_program: None,
            texture_allocations_left: None,
            incomplete_framebuffers: false,
            truncate_readback: false,
        }
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn set_feature_level(&mut self, level: FeatureLevel) {
        self.feature_level = level;
    }

    /// Lets `count` more `create_texture` calls succeed, then refuses
    pub fn fail_texture_allocation_after(&mut self, count: usize) {
        self.texture_allocations_left = Some(count);
    }

    /// Makes every framebuffer report a non-renderable attachment
    pub fn report_incomplete_framebuffers(&mut self) {
        self.incomplete_framebuffers = true;
    }

    /// Makes `read_pixels` return one byte too few
    pub fn truncate_readback(&mut self) {
        self.truncate_readback = true;
    }

    pub fn add_program(&mut self, kind: ProgramKind) -> ProgramId {
        let id = ProgramId(self.next());
        self.programs.insert(id, ProgramStatus::Ready(kind));
        id
    }

    pub fn add_invalid_program(&mut self, reason: &str) -> ProgramId {
        let id = ProgramId(self.next());
        self.programs.insert(id, ProgramStatus::Invalid(reason.to_string()));
        id
    }

    /// A caller-owned texture that is not counted as an invocation resource
    pub fn external_texture(&mut self) -> TextureId {
        let id = TextureId(self.next());
        self.external_textures.insert(id);
        id
    }

    pub fn external_glyphs(&mut self) -> GlyphTextures {
        GlyphTextures {
            edges: self.external_texture(),
            fill: self.external_texture(),
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<Uniform> {
        self.uniforms.get(&(program, name.to_string())).copied()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn is_live_texture(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn deleted_textures(&self) -> Vec<TextureId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::DeleteTexture(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn deletion_order(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::DeleteFramebuffer(_) => Some("framebuffer"),
                Call::DeleteTexture(_) => Some("texture"),
                Call::DeleteBuffer(_) => Some("buffer"),
                _ => None,
            })
            .collect()
    }

    /// Successful allocations of any kind recorded so far
    pub fn allocation_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::CreateTexture { .. } | Call::UploadTexture { .. } | Call::CreateFramebuffer(_) | Call::CreateBuffer { .. }))
            .count()
    }

    fn is_known_texture(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture) || self.external_textures.contains(&texture)
    }
}

impl RenderDevice for RecordingDevice {
    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn program_status(&self, program: ProgramId) -> ProgramStatus {
        self.programs.get(&program).cloned().unwrap_or(ProgramStatus::Unknown)
    }

    fn create_texture(&mut self, width: u32, height: u32, format: TargetFormat) -> Option<TextureId> {
        assert!(width > 0 && height > 0, "zero-sized texture requested");
        if let Some(left) = self.texture_allocations_left.as_mut() {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }

        let id = TextureId(self.next());
        self.textures.insert(id, format);
        self.calls.push(Call::CreateTexture { id, width, height, format });
        Some(id)
    }

    fn upload_texture(&mut self, pixels: &PixelBuffer) -> Option<TextureId> {
        let id = TextureId(self.next());
        self.textures.insert(id, TargetFormat::Rgba8Unorm);
        self.calls.push(Call::UploadTexture {
            id,
            width: pixels.width,
            height: pixels.height,
        });
        Some(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        assert!(self.textures.remove(&texture).is_some(), "{texture} deleted twice or never created");
        for slot in self.slots.iter_mut().filter(|slot| **slot == Some(texture)) {
            *slot = None;
        }
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let id = FramebufferId(self.next());
        self.framebuffers.insert(id, None);
        self.calls.push(Call::CreateFramebuffer(id));
        Some(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        assert!(self.framebuffers.remove(&framebuffer).is_some(), "{framebuffer} deleted twice or never created");
        self.calls.push(Call::DeleteFramebuffer(framebuffer));
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        assert!(self.is_known_texture(texture), "attaching unknown {texture}");
        let attachment = self.framebuffers.get_mut(&framebuffer).unwrap_or_else(|| panic!("attaching to unknown {framebuffer}"));
        *attachment = Some(texture);
        self.calls.push(Call::Attach { framebuffer, texture });
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        match self.framebuffers.get(&framebuffer).copied().flatten() {
            None => FramebufferStatus::MissingAttachment,
            Some(texture) => match self.textures.get(&texture) {
                None => FramebufferStatus::UnknownAttachment,
                Some(format) if self.incomplete_framebuffers => FramebufferStatus::NotRenderable(*format),
                Some(_) => FramebufferStatus::Complete,
            },
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Option<BufferId> {
        let id = BufferId(self.next());
        self.buffers.insert(id);
        self.calls.push(Call::CreateBuffer { id, kind, size: contents.len() });
        Some(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        assert!(self.buffers.remove(&buffer), "{buffer} deleted twice or never created");
        self.calls.push(Call::DeleteBuffer(buffer));
    }

    fn bind_texture(&mut self, slot: usize, texture: Option<TextureId>) {
        if let Some(texture) = texture {
            assert!(self.is_known_texture(texture), "binding unknown {texture}");
        }
        self.slots[slot] = texture;
        self.calls.push(Call::BindTexture { slot, texture });
    }

    fn bind_image(&mut self, unit: usize, texture: Option<TextureId>, access: ImageAccess) {
        assert!(unit < IMAGE_UNITS);
        self.calls.push(Call::BindImage { unit, texture, access });
    }

    fn use_program(&mut self, program: ProgramId) {
        self.active_program = Some(program);
        self.calls.push(Call::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) -> Result<(), DeviceError> {
        if !self.programs.contains_key(&program) {
            return Err(DeviceError::UnknownHandle { kind: "program", id: program.0 });
        }
        self.uniforms.insert((program, name.to_string()), value);
        self.calls.push(Call::SetUniform {
            program,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn draw(&mut self, target: DrawTarget, mesh: &Mesh) -> Result<(), DeviceError> {
        let program = self.active_program.ok_or(DeviceError::NoActiveProgram)?;
        assert!(self.buffers.contains(&mesh.vertex_buffer), "drawing with a released vertex buffer");

        let attachment = match target {
            DrawTarget::Framebuffer(framebuffer) => Some(self.framebuffers.get(&framebuffer).copied().flatten().ok_or(DeviceError::MissingAttachment)?),
            DrawTarget::Surface { .. } => None,
        };
        if let Some(attachment) = attachment {
            assert!(!self.slots.contains(&Some(attachment)), "pass samples its own output");
        }

        let pass_index = match self.uniform(program, "pass_index") {
            Some(Uniform::Int(index)) => Some(index),
            _ => None,
        };
        self.calls.push(Call::Draw(DrawRecord {
            target,
            attachment,
            slots: self.slots,
            mesh: *mesh,
            program,
            pass_index,
        }));
        Ok(())
    }

    fn dispatch_compute(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<(), DeviceError> {
        let program = self.active_program.ok_or(DeviceError::NoActiveProgram)?;
        if self.program_status(program) != ProgramStatus::Ready(ProgramKind::Compute) {
            return Err(DeviceError::ProgramKindMismatch(program, "compute"));
        }
        self.calls.push(Call::Dispatch {
            program,
            groups: [groups_x, groups_y, groups_z],
        });
        Ok(())
    }

    fn memory_barrier(&mut self) {
        self.calls.push(Call::MemoryBarrier);
    }

    fn read_pixels(&mut self, target: DrawTarget, width: u32, height: u32) -> Result<Vec<u8>, DeviceError> {
        self.calls.push(Call::ReadPixels { target, width, height });
        let mut len = width as usize * height as usize * 3;
        if self.truncate_readback {
            len -= 1;
        }
        Ok(vec![0; len])
    }
}
