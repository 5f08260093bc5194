//! Ordered execution of fragment passes

use crate::device::{DrawTarget, Mesh, ProgramId, RenderDevice, TEXTURE_SLOTS, TextureId, Uniform};
use crate::error::PipelineError;
use crate::framebuffer::FramebufferBinding;
use crate::invocation::Invocation;
use crate::quad::FullscreenQuad;
use crate::stage::{Pass, PassDescriptor, PassOutput, SEQUENCED_PASSES};
use crate::targets::{RenderTargets, TextureRole};

/// Runs passes of the shared fragment program
///
/// Every pass binds its declared inputs, points the framebuffer at its
/// output, sets `pass_index` and draws one quad.
pub struct PassSequencer<'a> {
    quad: &'a FullscreenQuad,
    program: ProgramId,
}

impl<'a> PassSequencer<'a> {
    pub fn new(quad: &'a FullscreenQuad, program: ProgramId) -> Self {
        Self { quad, program }
    }

    /// Runs [`SEQUENCED_PASSES`] in order
    ///
    /// # Arguments
    /// * `invocation` - Invocation owning the targets
    /// * `framebuffer` - The invocation's output slot
    /// * `targets` - Role table of the invocation
    /// * `on_pass` - Called after each pass with its output texture
    pub fn run_all<D, F>(&self, invocation: &mut Invocation<'_, D>, framebuffer: &mut FramebufferBinding, targets: &RenderTargets, on_pass: &mut F) -> Result<(), PipelineError>
    where
        D: RenderDevice,
        F: FnMut(&mut D, Pass, TextureId),
    {
        for descriptor in &SEQUENCED_PASSES {
            self.execute(invocation, framebuffer, targets, descriptor, self.quad.mesh())?;
            if let PassOutput::Target(role) = descriptor.output {
                on_pass(invocation.device(), descriptor.pass, targets.texture(role));
            }
        }
        Ok(())
    }

    /// Runs a single pass, drawing `mesh`
    pub fn execute<D: RenderDevice>(
        &self,
        invocation: &mut Invocation<'_, D>,
        framebuffer: &mut FramebufferBinding,
        targets: &RenderTargets,
        descriptor: &PassDescriptor,
        mesh: &Mesh,
    ) -> Result<(), PipelineError> {
        let device = invocation.device();
        bind_inputs(device, targets, descriptor.inputs);

        let target = match descriptor.output {
            PassOutput::Target(role) => framebuffer.attach(device, targets.texture(role), descriptor.pass)?,
            PassOutput::Surface => DrawTarget::Surface {
                width: targets.width(),
                height: targets.height(),
            },
        };

        device.use_program(self.program);
        device.set_uniform(self.program, "pass_index", Uniform::Int(descriptor.pass.index()))?;
        device.draw(target, mesh)?;

        tracing::debug!(pass = %descriptor.pass, ?target, "pass complete");
        Ok(())
    }

    /// The fullscreen quad shared by all fragment passes
    pub fn quad(&self) -> &FullscreenQuad {
        self.quad
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }
}

/// Binds `inputs` to slots `0..inputs.len()` and clears the remaining slots
///
/// Clearing keeps a stale binding from aliasing the next pass's output.
pub fn bind_inputs<D: RenderDevice>(device: &mut D, targets: &RenderTargets, inputs: &[TextureRole]) {
    for slot in 0..TEXTURE_SLOTS {
        device.bind_texture(slot, inputs.get(slot).map(|role| targets.texture(*role)));
    }
}
