//! The invocation's single color output slot

use crate::device::{DrawTarget, FramebufferId, FramebufferStatus, RenderDevice, TextureId};
use crate::error::PipelineError;
use crate::invocation::Invocation;
use crate::stage::Pass;

/// Tracks which render target the invocation's framebuffer currently writes
#[derive(Debug)]
pub struct FramebufferBinding {
    id: FramebufferId,
    attached: Option<TextureId>,
}

impl FramebufferBinding {
    /// Creates the framebuffer, owned by `invocation`
    pub fn create<D: RenderDevice>(invocation: &mut Invocation<'_, D>) -> Result<Self, PipelineError> {
        let id = invocation.create_framebuffer().ok_or_else(|| PipelineError::Allocation("framebuffer".into()))?;
        tracing::debug!(framebuffer = %id, "framebuffer created");
        Ok(Self { id, attached: None })
    }

    /// Attaches `texture` and checks that it can be rendered to
    ///
    /// # Returns
    /// The draw target to hand to the pass, or [`PipelineError::IncompleteFramebuffer`]
    pub fn attach<D: RenderDevice>(&mut self, device: &mut D, texture: TextureId, pass: Pass) -> Result<DrawTarget, PipelineError> {
        if self.attached != Some(texture) {
            device.attach_color(self.id, texture);
            self.attached = Some(texture);
        }

        match device.framebuffer_status(self.id) {
            FramebufferStatus::Complete => Ok(DrawTarget::Framebuffer(self.id)),
            status => Err(PipelineError::IncompleteFramebuffer { pass, status }),
        }
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    /// The texture attached by the last successful or failed [`attach`](Self::attach)
    pub fn attached(&self) -> Option<TextureId> {
        self.attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TargetFormat;
    use crate::device::recording::{Call, RecordingDevice};

    #[test]
    fn test_attach_returns_framebuffer_target() {
        let mut device = RecordingDevice::new();
        let mut invocation = Invocation::new(&mut device);
        let texture = invocation.create_texture(8, 8, TargetFormat::R16Float).unwrap();
        let mut framebuffer = FramebufferBinding::create(&mut invocation).unwrap();

        let target = framebuffer.attach(invocation.device(), texture, Pass::Luminance).unwrap();
        assert_eq!(target, DrawTarget::Framebuffer(framebuffer.id()));
        assert_eq!(framebuffer.attached(), Some(texture));
    }

    #[test]
    fn test_reattaching_same_texture_is_skipped() {
        let mut device = RecordingDevice::new();
        let mut invocation = Invocation::new(&mut device);
        let texture = invocation.create_texture(8, 8, TargetFormat::R16Float).unwrap();
        let mut framebuffer = FramebufferBinding::create(&mut invocation).unwrap();

        framebuffer.attach(invocation.device(), texture, Pass::Luminance).unwrap();
        framebuffer.attach(invocation.device(), texture, Pass::Luminance).unwrap();
        drop(invocation);

        let attaches = device.calls().iter().filter(|call| matches!(call, Call::Attach { .. })).count();
        assert_eq!(attaches, 1);
    }

    #[test]
    fn test_incomplete_framebuffer_is_reported() {
        let mut device = RecordingDevice::new();
        device.report_incomplete_framebuffers();
        let mut invocation = Invocation::new(&mut device);
        let texture = invocation.create_texture(8, 8, TargetFormat::Rgba16Float).unwrap();
        let mut framebuffer = FramebufferBinding::create(&mut invocation).unwrap();

        let error = framebuffer.attach(invocation.device(), texture, Pass::EdgeDetect).unwrap_err();
        assert!(matches!(
            error,
            PipelineError::IncompleteFramebuffer {
                pass: Pass::EdgeDetect,
                status: FramebufferStatus::NotRenderable(TargetFormat::Rgba16Float)
            }
        ));
    }
}
