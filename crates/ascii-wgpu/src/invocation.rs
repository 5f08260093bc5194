//! Per-invocation resource tracking
//!
//! [`Invocation`] is the only way the orchestrator allocates device
//! resources. It remembers every handle it hands out and deletes them all when
//! dropped, so early returns through `?` cannot leak.

use crate::codec::PixelBuffer;
use crate::device::{BufferId, BufferKind, FramebufferId, RenderDevice, TargetFormat, TextureId};

/// Exclusive access to a device for one pipeline run, plus the resources it created
pub struct Invocation<'d, D: RenderDevice> {
    device: &'d mut D,
    textures: Vec<TextureId>,
    framebuffers: Vec<FramebufferId>,
    buffers: Vec<BufferId>,
}

impl<'d, D: RenderDevice> Invocation<'d, D> {
    pub fn new(device: &'d mut D) -> Self {
        Self {
            device,
            textures: Vec::new(),
            framebuffers: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// The underlying device, for binding and drawing
    pub fn device(&mut self) -> &mut D {
        self.device
    }

    /// Allocates a tracked render target
    pub fn create_texture(&mut self, width: u32, height: u32, format: TargetFormat) -> Option<TextureId> {
        let texture = self.device.create_texture(width, height, format)?;
        self.textures.push(texture);
        Some(texture)
    }

    /// Uploads a tracked sampled texture
    pub fn upload_texture(&mut self, pixels: &PixelBuffer) -> Option<TextureId> {
        let texture = self.device.upload_texture(pixels)?;
        self.textures.push(texture);
        Some(texture)
    }

    pub fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let framebuffer = self.device.create_framebuffer()?;
        self.framebuffers.push(framebuffer);
        Some(framebuffer)
    }

    pub fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Option<BufferId> {
        let buffer = self.device.create_buffer(kind, contents)?;
        self.buffers.push(buffer);
        Some(buffer)
    }

    /// Number of resources that will be released on drop
    pub fn tracked_resources(&self) -> usize {
        self.textures.len() + self.framebuffers.len() + self.buffers.len()
    }

    fn release(&mut self) {
        let count = self.tracked_resources();
        if count == 0 {
            return;
        }

        // Framebuffers first so no attachment outlives its texture
        for framebuffer in self.framebuffers.drain(..).rev() {
            self.device.delete_framebuffer(framebuffer);
        }
        for texture in self.textures.drain(..).rev() {
            self.device.delete_texture(texture);
        }
        for buffer in self.buffers.drain(..).rev() {
            self.device.delete_buffer(buffer);
        }

        tracing::debug!(count, "released invocation resources");
    }
}

impl<D: RenderDevice> Drop for Invocation<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}
